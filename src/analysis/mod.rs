pub mod boundary;
pub mod convergence;
pub mod steps;
