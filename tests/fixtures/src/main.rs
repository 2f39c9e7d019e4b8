use std::io::Write;
use std::thread;
use std::time::Duration;

const MARKER_LEN: usize = 4 * 1024 * 1024;

fn main() {
    // A recognizable pattern the capture tests can locate at a known address.
    // Large enough that the allocator gives it its own mapping and the
    // chunked reader needs several chunks to cross it.
    let marker: Vec<u8> = (0..MARKER_LEN).map(|i| (i % 251) as u8).collect();

    println!("MARKER {:016X} {}", marker.as_ptr() as usize, marker.len());
    std::io::stdout().flush().expect("flush stdout");

    // Park until the harness kills us.
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
