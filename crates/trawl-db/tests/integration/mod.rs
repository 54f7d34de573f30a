mod common;
mod job_tests;
mod pipeline_tests;
mod record_tests;
mod run_tests;
