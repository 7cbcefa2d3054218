//! Lead Assist — WhatsApp funnel assistant for a mortgage-credit lead flow.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod faq;
pub mod gateway;
pub mod llm;
pub mod normalize;
pub mod queue;
pub mod similarity;
pub mod store;
pub mod webhook;
