//! Behavioural coverage for baseline recording and drift validation.

#[path = "drift/bdd_steps.rs"]
mod bdd_steps;
#[path = "drift/scenarios.rs"]
mod scenarios;
#[path = "drift/test_helpers.rs"]
mod test_helpers;
