//! Unit tests for the checksum module.
