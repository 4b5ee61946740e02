pub mod helpers;
mod tests_builder;


// Shared readers and filters
mod tests_concurrency;
