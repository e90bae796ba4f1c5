//! Reusable test utilities:
//! - In-memory test database with seed helpers
//! - Mock webhook receiver built on wiremock
//! - Recording SMTP sender
//! - Manually advanced clock for evaluator timing tests

// Allow unused code in test fixtures - not every suite uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
