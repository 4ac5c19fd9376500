#![allow(missing_docs)]

mod serve;

const fn main() {}
