//! String-bearing objects: one inline (small) text field and one heap field.

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn profile_drop() -> &'static str {
    "~UserProfile"
}

fn record_drop() -> &'static str {
    "~LogRecord"
}

vtable!(_ZTV11UserProfile, _ZTI11UserProfile, "UserProfile", [profile_drop]);
vtable!(_ZTV9LogRecord, _ZTI9LogRecord, "LogRecord", [record_drop]);

pub const BIO_LEN: usize = 200;
pub const MESSAGE_LEN: usize = 300;
pub const RAW_LEN: usize = 150;

/// Inline text of at most 15 bytes; never touches the heap.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct ShortName {
    len: u8,
    bytes: [u8; 15],
}

impl ShortName {
    /// Truncates to 15 bytes on a char boundary.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut end = text.len().min(15);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; 15];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self {
            len: end as u8,
            bytes,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or_default()
    }
}

#[repr(C)]
pub struct UserProfile {
    vptr: VPtr,
    pub uid: i32,
    pub username: ShortName,
    pub bio: String,
    pub score: f64,
}

#[repr(C)]
pub struct LogRecord {
    vptr: VPtr,
    pub log_id: i32,
    pub message: String,
    pub source: ShortName,
    pub level: i32,
}

/// `len` copies of one ASCII letter; the heap buffer is exactly `len` bytes.
#[must_use]
pub fn filled_text(first: u8, span: u8, index: usize, len: usize) -> String {
    let letter = char::from(first + (index % usize::from(span)) as u8);
    letter.to_string().repeat(len)
}

impl TypedObject for UserProfile {
    const TYPE_NAME: &'static str = "UserProfile";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV11UserProfile.vptr(),
            uid: index as i32,
            username: ShortName::new(&format!("u{index:05}")),
            bio: filled_text(b'A', 26, index, BIO_LEN),
            score: 100.0 + index as f64,
        }
    }
}

impl TypedObject for LogRecord {
    const TYPE_NAME: &'static str = "LogRecord";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV9LogRecord.vptr(),
            log_id: index as i32,
            message: filled_text(b'X', 3, index, MESSAGE_LEN),
            source: ShortName::new(&format!("src{}", index % 10)),
            level: (index % 5) as i32,
        }
    }
}

/// Standalone boxed string with a [`RAW_LEN`]-byte buffer.
#[must_use]
pub fn raw_string(index: usize) -> Box<String> {
    Box::new(filled_text(b'a', 26, index, RAW_LEN))
}

impl UserProfile {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}
