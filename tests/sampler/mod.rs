// Tests for the posterior samplers and walker position editing

mod mcmc_tests;
mod ofti_tests;
mod positions_tests;
