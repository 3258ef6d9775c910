//! Data models for the plakat pipeline

pub mod event;

pub use event::{
    Artist, Category, Contact, EventRecord, Location, Metadata, Pricing, Schedule, SchemaError,
    TicketInfo,
};
