mod bootstrap;
mod brains;
mod config;
mod demo_level;
mod loop_runner;

pub(crate) use loop_runner::run;
