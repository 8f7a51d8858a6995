pub mod builder;
pub mod cleaner;
pub mod composite;
pub mod config;
pub mod csv_io;
pub mod ols;
pub mod panel;
pub mod pca;
pub mod pipeline;
pub mod raw;
pub mod regression;
pub mod report;
pub mod synth;
