// src/lib.rs
// Reliable RabbitMQ messaging and the order fulfillment choreography built on it

pub mod config;
pub mod env;
pub mod message;
pub mod models;
pub mod processing;
pub mod rabbitmq;
pub mod store;
