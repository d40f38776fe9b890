pub mod calendar;
pub mod chat;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod tasks;
pub mod users;
pub mod web;

#[cfg(test)]
pub mod test_utils;
