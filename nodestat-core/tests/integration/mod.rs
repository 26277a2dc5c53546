mod node_tests;
mod watch_tests;
