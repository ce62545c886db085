fn main() {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/query.proto"], &["proto"])
        .expect("failed to compile proto/query.proto");
}
