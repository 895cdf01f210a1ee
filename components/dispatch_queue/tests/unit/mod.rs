//! Unit test aggregate for dispatch_queue

mod lane_tests;
