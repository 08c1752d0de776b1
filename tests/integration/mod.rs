//! Integration tests - full pipeline runs from logical plans to the
//! published algebra.

mod pipeline;
