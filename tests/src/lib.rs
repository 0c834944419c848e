//! Host-side integration tests and a closed-loop airframe simulation

pub mod sim;

#[cfg(test)]
mod arming_tests;
#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod indicator_tests;
#[cfg(test)]
mod link_tests;
#[cfg(test)]
mod scenario_tests;
#[cfg(test)]
mod stabilizer_tests;
