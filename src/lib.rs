pub mod alignment;
pub mod cache;
pub mod commands;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod features;
pub mod indicators;
pub mod labels;
pub mod models;
pub mod predictor;
pub mod prices;
pub mod ratios;
pub mod report;
pub mod results;
pub mod score;
pub mod selection;
pub mod split;
pub mod statements;
pub mod universe;
