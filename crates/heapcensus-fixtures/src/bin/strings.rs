//! Objects with inline short names and heap-allocated text, plus boxed
//! standalone strings.

use heapcensus_core::{CensusKey, Result};
use heapcensus_fixtures::objects::strings::{
    BIO_LEN, LogRecord, MESSAGE_LEN, RAW_LEN, UserProfile, raw_string,
};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{LOG_RECORDS, PROFILES, RAW_STRINGS, string_header_key};

fn main() -> Result<()> {
    run_fixture("strings", |run| {
        run.phase("Allocating UserProfile instances")?;
        let started = std::time::Instant::now();
        let profiles = run.objects::<UserProfile>(PROFILES)?;
        let bios = profiles
            .iter()
            // SAFETY: profiles are live for the rest of the process.
            .map(|p| unsafe { p.as_ref() }.bio.as_ptr() as usize)
            .collect();
        run.retained().publish(CensusKey::block(BIO_LEN), bios);
        run.record_class(&CensusKey::block(BIO_LEN), started)?;

        run.phase("Allocating LogRecord instances")?;
        let started = std::time::Instant::now();
        let records = run.objects::<LogRecord>(LOG_RECORDS)?;
        let messages = records
            .iter()
            // SAFETY: records are live for the rest of the process.
            .map(|r| unsafe { r.as_ref() }.message.as_ptr() as usize)
            .collect();
        run.retained().publish(CensusKey::block(MESSAGE_LEN), messages);
        run.record_class(&CensusKey::block(MESSAGE_LEN), started)?;

        run.phase("Allocating raw strings")?;
        let started = std::time::Instant::now();
        let raw: Vec<Box<String>> = (0..RAW_STRINGS).map(raw_string).collect();
        run.retained().publish(
            string_header_key(),
            raw.iter().map(|s| std::ptr::from_ref::<String>(s) as usize).collect(),
        );
        run.retained().publish(
            CensusKey::block(RAW_LEN),
            raw.iter().map(|s| s.as_ptr() as usize).collect(),
        );
        run.record_class(&string_header_key(), started)?;
        run.record_class(&CensusKey::block(RAW_LEN), started)?;
        Ok(raw)
    })
}
