//! Building queries: the [`spec::QuerySpec`] callers fill in and its validated wire form.

pub mod builder;
pub mod defaults;
pub mod spec;
pub mod time;
