//! Generated code for `proto/query.proto`, compiled by `build.rs`.

tonic::include_proto!("ccmon.query.v1");
