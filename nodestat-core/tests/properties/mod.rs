mod gpu_schema_tests;
mod parser_tests;
