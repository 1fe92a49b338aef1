#![no_main]
use iplocation::Database;
use libfuzzer_sys::fuzz_target;

// First four bytes pick the address, the rest is the database image
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let ip = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

    if let Ok(db) = Database::from_bytes_builder(data[4..].to_vec())
        .max_redirect_depth(8)
        .open()
    {
        let _ = db.lookup_raw(ip);
        let _ = db.lookup_ip(ip.into());
    }
});
