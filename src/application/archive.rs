//! Store-only ZIP encoding for batch exports.
//!
//! Entries are written uncompressed: one local header plus raw bytes per
//! entry, a central directory, and the end-of-central-directory record.
//! Well-formed input cannot fail to encode; duplicate entry names are a
//! programmer error.

use chrono::{DateTime, Datelike, Timelike, Utc};

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const END_RECORD_SIGNATURE: u32 = 0x0605_4b50;
const ZIP_VERSION: u16 = 20;

const CRC32_TABLE: [u32; 256] = build_crc32_table();

/// One file inside an archive. Names use forward slashes for nesting and
/// must be unique within a single archive build.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Encode the entries into a single ZIP byte buffer. Entry order is
/// preserved; every entry carries the given modification timestamp.
#[must_use]
pub fn encode_archive(entries: &[ArchiveEntry], modified_at: &DateTime<Utc>) -> Vec<u8> {
    debug_assert!(
        has_unique_names(entries),
        "archive entry names must be unique"
    );

    let (dos_date, dos_time) = dos_date_time(modified_at);
    let mut locals: Vec<u8> = Vec::new();
    let mut central: Vec<u8> = Vec::new();

    for entry in entries {
        let name = entry.name.as_bytes();
        let crc = crc32(&entry.data);
        let size = entry.data.len() as u32;
        let local_offset = locals.len() as u32;

        put_u32(&mut locals, LOCAL_HEADER_SIGNATURE);
        put_u16(&mut locals, ZIP_VERSION);
        put_u16(&mut locals, 0); // flags
        put_u16(&mut locals, 0); // method: stored
        put_u16(&mut locals, dos_time);
        put_u16(&mut locals, dos_date);
        put_u32(&mut locals, crc);
        put_u32(&mut locals, size);
        put_u32(&mut locals, size);
        put_u16(&mut locals, name.len() as u16);
        put_u16(&mut locals, 0); // extra field length
        locals.extend_from_slice(name);
        locals.extend_from_slice(&entry.data);

        put_u32(&mut central, CENTRAL_HEADER_SIGNATURE);
        put_u16(&mut central, ZIP_VERSION); // version made by
        put_u16(&mut central, ZIP_VERSION); // version needed
        put_u16(&mut central, 0); // flags
        put_u16(&mut central, 0); // method: stored
        put_u16(&mut central, dos_time);
        put_u16(&mut central, dos_date);
        put_u32(&mut central, crc);
        put_u32(&mut central, size);
        put_u32(&mut central, size);
        put_u16(&mut central, name.len() as u16);
        put_u16(&mut central, 0); // extra field length
        put_u16(&mut central, 0); // comment length
        put_u16(&mut central, 0); // disk number start
        put_u16(&mut central, 0); // internal attributes
        put_u32(&mut central, 0); // external attributes
        put_u32(&mut central, local_offset);
        central.extend_from_slice(name);
    }

    let central_offset = locals.len() as u32;
    let central_size = central.len() as u32;
    let entry_count = entries.len() as u16;

    let mut out = locals;
    out.extend_from_slice(&central);
    put_u32(&mut out, END_RECORD_SIGNATURE);
    put_u16(&mut out, 0); // disk number
    put_u16(&mut out, 0); // central directory start disk
    put_u16(&mut out, entry_count);
    put_u16(&mut out, entry_count);
    put_u32(&mut out, central_size);
    put_u32(&mut out, central_offset);
    put_u16(&mut out, 0); // comment length
    out
}

/// CRC-32 (reflected, polynomial `0xedb88320`) over the given bytes.
#[must_use]
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xffff_ffff_u32;
    for &byte in bytes {
        let idx = ((crc ^ u32::from(byte)) & 0xff) as usize;
        crc = CRC32_TABLE[idx] ^ (crc >> 8);
    }
    crc ^ 0xffff_ffff
}

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0_u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut j = 0;
        while j < 8 {
            c = if c & 1 == 1 { 0xedb8_8320 ^ (c >> 1) } else { c >> 1 };
            j += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// Pack a timestamp into MS-DOS date and time words. Years before 1980
/// clamp to the epoch; seconds store at two-second resolution.
fn dos_date_time(moment: &DateTime<Utc>) -> (u16, u16) {
    let year = moment.year().max(1980) as u32;
    let date = ((year - 1980) << 9) | (moment.month() << 5) | moment.day();
    let time = (moment.hour() << 11) | (moment.minute() << 5) | (moment.second() >> 1);
    ((date & 0xffff) as u16, (time & 0xffff) as u16)
}

fn has_unique_names(entries: &[ArchiveEntry]) -> bool {
    let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    names.windows(2).all(|pair| pair[0] != pair[1])
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}
