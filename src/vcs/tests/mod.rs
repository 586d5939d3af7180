//! Unit tests for the version control wrappers.

mod svn;
