fn main() {
    println!("{}", adkar_server::openapi::generate_schema());
}
