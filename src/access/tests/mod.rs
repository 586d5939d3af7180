//! Unit tests for the access module.

mod local;
