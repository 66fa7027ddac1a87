mod cloud_init_tests;
mod config_tests;
mod persist_tests;
mod round_trip_tests;
