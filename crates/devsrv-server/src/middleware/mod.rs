//! Tower middleware applied to every route.

pub(crate) mod headers;
