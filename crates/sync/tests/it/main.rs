#![allow(missing_docs)]

mod pipeline;

const fn main() {}
