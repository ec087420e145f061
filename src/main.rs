#[tokio::main]
async fn main() {
    if let Err(e) = wardscribe_lib::run().await {
        eprintln!("wardscribe: {e}");
        std::process::exit(1);
    }
}
