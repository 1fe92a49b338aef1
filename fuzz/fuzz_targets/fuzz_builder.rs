#![no_main]
use iplocation::{Database, DatabaseBuilder};
use libfuzzer_sys::fuzz_target;

// Names taken from fuzz input: whatever the builder accepts must read back
// byte-for-byte.
fuzz_target!(|data: &[u8]| {
    let mut parts = data.splitn(3, |&b| b == b'|');
    let country = parts.next().unwrap_or_default().to_vec();
    let area = parts.next().unwrap_or_default().to_vec();

    let mut builder = DatabaseBuilder::new();
    if builder.add_raw_range(0, 0x7FFF_FFFF, country.clone(), area.clone()).is_err() {
        return;
    }
    builder.add_raw_range(0x8000_0000, u32::MAX, area.clone(), country.clone()).ok();

    let Ok(bytes) = builder.build() else {
        return;
    };
    let db = Database::from_bytes(bytes).expect("built database must load");
    let raw = db.lookup_raw(1).expect("built record must resolve");
    assert_eq!(raw.country, country);
    if area.is_empty() {
        assert!(raw.area_is_unknown());
    } else {
        assert_eq!(raw.area, area);
    }
});
