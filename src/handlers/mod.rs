// src/handlers/mod.rs

pub mod admin;
pub mod attempt;
pub mod catalog;
pub mod dashboard;
pub mod manage;
