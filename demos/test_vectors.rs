//! Print flattened test messages as Rust byte vectors, ready to paste into a test.
//!
//! Usage: `cargo run --example test_vectors [uid]`. Set `RUST_LOG=bmessage=trace` to see the
//! library's events.

use bmessage::{four_cc, Message, Result};
use tracing_subscriber::EnvFilter;

fn print_vector(msg: &Message) -> Result<()> {
    println!("{}", msg);
    let mut buf = vec![0u8; msg.flattened_size()];
    msg.flatten(&mut buf)?;
    print!("let msg: Vec<u8> = vec!(");
    for byte in buf.iter() {
        print!("{}, ", byte);
    }
    println!(");\n");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let uid: i32 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0);

    print_vector(&Message::new(four_cc(b"abcd")))?;

    let mut msg = Message::new(four_cc(b"efgh"));
    msg.add_uint8("UInt8", b'a')?;
    msg.add_uint16("UInt16", 1234)?;
    print_vector(&msg)?;

    let mut msg = Message::new(four_cc(b"lnda"));
    msg.add_string("name", "application/x-vnd.haiku-registrar")?;
    msg.add_int32("user", uid)?;
    print_vector(&msg)?;

    Ok(())
}
