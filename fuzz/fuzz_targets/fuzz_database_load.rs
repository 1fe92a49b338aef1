#![no_main]
use iplocation::{validate, Database};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes as a database image: loading, validating and walking
// every entry must return errors, never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(db) = Database::from_bytes(data.to_vec()) {
        let _ = db.version();
        let _ = validate(&db);
        for i in 0..db.entry_count().min(64) {
            let _ = db.range(i);
            let _ = db.locate_entry(i);
        }
    }
});
