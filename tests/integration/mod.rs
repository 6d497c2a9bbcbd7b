// End-to-end fits of a synthetic single-companion system

mod mcmc_scenario;
mod ofti_scenario;
mod results_scenario;
