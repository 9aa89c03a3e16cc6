//! Periodic trigger for the scheduler poll and the re-engagement run.

pub mod runner;
