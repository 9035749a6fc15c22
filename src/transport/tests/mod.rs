use super::*;
use crate::transport::test_helpers::{MemoryServer, RecordingSink, test_config, wait_until};
use std::sync::atomic::Ordering;
