//! Hand-assembled fixtures shared by the integration tests.
//!
//! Every builder returns a small but well-formed file so tests do not depend
//! on sample binaries being present on disk.
#![allow(dead_code)]

use binlayout::{detect, Palette, ParsedFile};
use bytes::Bytes;

pub fn parse_bytes(data: Vec<u8>, name: &str) -> ParsedFile {
    detect(Bytes::from(data), name, Palette::Dark)
}

fn put16le(d: &mut [u8], at: usize, v: u16) {
    d[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put32le(d: &mut [u8], at: usize, v: u32) {
    d[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put64le(d: &mut [u8], at: usize, v: u64) {
    d[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

fn put16be(d: &mut [u8], at: usize, v: u16) {
    d[at..at + 2].copy_from_slice(&v.to_be_bytes());
}

fn put32be(d: &mut [u8], at: usize, v: u32) {
    d[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

fn put_name(d: &mut [u8], at: usize, name: &str) {
    d[at..at + name.len()].copy_from_slice(name.as_bytes());
}

/// PE32 with `.text` (raw 0x200..0x400, RVA 0x1000) and `.data`
/// (raw 0x400..0x600, RVA 0x2000). 0x600 bytes.
pub fn pe32() -> Vec<u8> {
    let mut d = vec![0u8; 0x600];
    put_name(&mut d, 0, "MZ");
    put32le(&mut d, 0x3C, 0x80);
    put_name(&mut d, 0x80, "PE\0\0");
    let coff = 0x84;
    put16le(&mut d, coff, 0x014C);
    put16le(&mut d, coff + 2, 2);
    put32le(&mut d, coff + 4, 0x5F5E_1000);
    put16le(&mut d, coff + 16, 96 + 16 * 8);
    put16le(&mut d, coff + 18, 0x0102);
    let opt = 0x98;
    put16le(&mut d, opt, 0x10B);
    put32le(&mut d, opt + 16, 0x1000);
    put32le(&mut d, opt + 28, 0x0040_0000);
    put16le(&mut d, opt + 68, 3);
    put32le(&mut d, opt + 92, 16);

    let sections = [
        (".text", 0x180u32, 0x1000u32, 0x200u32, 0x200u32, 0x6000_0020u32),
        (".data", 0x80, 0x2000, 0x200, 0x400, 0xC000_0040),
    ];
    for (i, (name, vsize, va, raw_size, raw_ptr, flags)) in sections.iter().enumerate() {
        let sh = opt + 96 + 128 + i * 40;
        put_name(&mut d, sh, name);
        put32le(&mut d, sh + 8, *vsize);
        put32le(&mut d, sh + 12, *va);
        put32le(&mut d, sh + 16, *raw_size);
        put32le(&mut d, sh + 20, *raw_ptr);
        put32le(&mut d, sh + 36, *flags);
    }
    put_name(&mut d, 0x210, "Hello, layout!");
    d
}

/// ELF64 LE executable: one `PT_LOAD`, sections `.text` at 0x100 and
/// `.shstrtab` at 0x120. 0x200 bytes.
pub fn elf64() -> Vec<u8> {
    let mut d = vec![0u8; 0x200];
    d[0..4].copy_from_slice(b"\x7fELF");
    d[4] = 2;
    d[5] = 1;
    d[6] = 1;
    put16le(&mut d, 16, 2);
    put16le(&mut d, 18, 62);
    put64le(&mut d, 24, 0x401000);
    put64le(&mut d, 32, 64);
    put64le(&mut d, 40, 0x140);
    put16le(&mut d, 54, 56);
    put16le(&mut d, 56, 1);
    put16le(&mut d, 58, 64);
    put16le(&mut d, 60, 3);
    put16le(&mut d, 62, 2);

    let ph = 64;
    put32le(&mut d, ph, 1);
    put32le(&mut d, ph + 4, 5);
    put64le(&mut d, ph + 16, 0x400000);
    put64le(&mut d, ph + 32, 0x200);
    put64le(&mut d, ph + 40, 0x200);

    let text = 0x140 + 64;
    put32le(&mut d, text, 1);
    put32le(&mut d, text + 4, 1);
    put64le(&mut d, text + 8, 6);
    put64le(&mut d, text + 16, 0x401000);
    put64le(&mut d, text + 24, 0x100);
    put64le(&mut d, text + 32, 0x20);

    let strtab = 0x140 + 128;
    put32le(&mut d, strtab, 7);
    put32le(&mut d, strtab + 4, 3);
    put64le(&mut d, strtab + 24, 0x120);
    put64le(&mut d, strtab + 32, 0x11);
    d[0x120..0x131].copy_from_slice(b"\0.text\0.shstrtab\0");
    d
}

/// ELF32 big-endian PowerPC executable: `PT_LOAD` plus `PT_INTERP`
/// (`/lib/ld.so.1` at 0x80), sections `.text` at 0x100 and `.shstrtab` at
/// 0x120, section table at 0x140. 0x200 bytes.
pub fn elf32_be() -> Vec<u8> {
    let mut d = vec![0u8; 0x200];
    d[0..4].copy_from_slice(b"\x7fELF");
    d[4] = 1;
    d[5] = 2;
    d[6] = 1;
    put16be(&mut d, 16, 2);
    put16be(&mut d, 18, 20);
    put32be(&mut d, 20, 1);
    put32be(&mut d, 24, 0x1000_0100);
    put32be(&mut d, 28, 52);
    put32be(&mut d, 32, 0x140);
    put16be(&mut d, 40, 52);
    put16be(&mut d, 42, 32);
    put16be(&mut d, 44, 2);
    put16be(&mut d, 46, 40);
    put16be(&mut d, 48, 3);
    put16be(&mut d, 50, 2);

    let load = 52;
    put32be(&mut d, load, 1);
    put32be(&mut d, load + 8, 0x1000_0000);
    put32be(&mut d, load + 16, 0x200);
    put32be(&mut d, load + 20, 0x200);
    put32be(&mut d, load + 24, 5);
    let interp = 52 + 32;
    put32be(&mut d, interp, 3);
    put32be(&mut d, interp + 4, 0x80);
    put32be(&mut d, interp + 8, 0x1000_0080);
    put32be(&mut d, interp + 16, 13);
    put32be(&mut d, interp + 20, 13);
    put32be(&mut d, interp + 24, 4);
    d[0x80..0x8D].copy_from_slice(b"/lib/ld.so.1\0");

    let text = 0x140 + 40;
    put32be(&mut d, text, 1);
    put32be(&mut d, text + 4, 1);
    put32be(&mut d, text + 8, 6);
    put32be(&mut d, text + 12, 0x1000_0100);
    put32be(&mut d, text + 16, 0x100);
    put32be(&mut d, text + 20, 0x20);

    let strtab = 0x140 + 80;
    put32be(&mut d, strtab, 7);
    put32be(&mut d, strtab + 4, 3);
    put32be(&mut d, strtab + 16, 0x120);
    put32be(&mut d, strtab + 20, 0x11);
    d[0x120..0x131].copy_from_slice(b"\0.text\0.shstrtab\0");
    d
}

/// `pe32()` with SizeOfOptionalHeader cut to `size`; the section table is
/// moved to follow the shortened header.
pub fn pe32_short_optional(size: u16) -> Vec<u8> {
    let mut d = pe32();
    let old_table = 0x98 + 224;
    let new_table = 0x98 + size as usize;
    let table: Vec<u8> = d[old_table..old_table + 80].to_vec();
    d[old_table..old_table + 80].fill(0);
    d[new_table..new_table + 80].copy_from_slice(&table);
    put16le(&mut d, 0x84 + 16, size);
    d
}

/// Thin 64-bit Mach-O for `cputype`: `__TEXT` (one `__text` section at
/// 0x300) from offset 0, `__DATA` at 0x400, `LC_MAIN`. 0x500 bytes.
pub fn macho64(cputype: u32) -> Vec<u8> {
    let mut d = vec![0u8; 0x500];
    put32le(&mut d, 0, 0xFEED_FACF);
    put32le(&mut d, 4, cputype);
    put32le(&mut d, 12, 2);
    put32le(&mut d, 16, 3);
    put32le(&mut d, 20, 152 + 72 + 24);

    let c = 32;
    put32le(&mut d, c, 0x19);
    put32le(&mut d, c + 4, 152);
    put_name(&mut d, c + 8, "__TEXT");
    put64le(&mut d, c + 24, 0x1_0000_0000);
    put64le(&mut d, c + 32, 0x1000);
    put64le(&mut d, c + 48, 0x400);
    put32le(&mut d, c + 56, 5);
    put32le(&mut d, c + 60, 5);
    put32le(&mut d, c + 64, 1);
    let s = c + 72;
    put_name(&mut d, s, "__text");
    put_name(&mut d, s + 16, "__TEXT");
    put64le(&mut d, s + 32, 0x1_0000_0300);
    put64le(&mut d, s + 40, 0x40);
    put32le(&mut d, s + 48, 0x300);
    put32le(&mut d, s + 64, 0x8000_0400);

    let c = 32 + 152;
    put32le(&mut d, c, 0x19);
    put32le(&mut d, c + 4, 72);
    put_name(&mut d, c + 8, "__DATA");
    put64le(&mut d, c + 24, 0x1_0000_1000);
    put64le(&mut d, c + 32, 0x1000);
    put64le(&mut d, c + 40, 0x400);
    put64le(&mut d, c + 48, 0x100);
    put32le(&mut d, c + 56, 3);
    put32le(&mut d, c + 60, 3);

    let c = 32 + 152 + 72;
    put32le(&mut d, c, 0x8000_0028);
    put32le(&mut d, c + 4, 24);
    put64le(&mut d, c + 8, 0x300);
    d
}

/// Fat binary whose slices are placed at the given offsets, 0x1000 apart by default.
pub fn fat(cpus: &[u32], offsets: &[u32]) -> Vec<u8> {
    let slice_len = 0x500usize;
    let end = offsets.iter().map(|&o| o as usize + slice_len).max().unwrap_or(0x1000);
    let mut d = vec![0u8; end];
    put32be(&mut d, 0, 0xCAFE_BABE);
    put32be(&mut d, 4, cpus.len() as u32);
    for (i, (&cpu, &offset)) in cpus.iter().zip(offsets).enumerate() {
        let at = 8 + i * 20;
        put32be(&mut d, at, cpu);
        put32be(&mut d, at + 8, offset);
        put32be(&mut d, at + 12, slice_len as u32);
        put32be(&mut d, at + 16, 12);
        let slice = macho64(cpu);
        d[offset as usize..offset as usize + slice_len].copy_from_slice(&slice);
    }
    d
}

pub fn png_chunk(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// 4x3 RGBA PNG with an IDAT and IEND.
pub fn png() -> Vec<u8> {
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&4u32.to_be_bytes());
    ihdr.extend_from_slice(&3u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
    let mut d = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    d.extend(png_chunk(b"IHDR", &ihdr));
    d.extend(png_chunk(b"IDAT", &[0x78, 0x9C, 0x63, 0x60, 0x00, 0x00]));
    d.extend(png_chunk(b"IEND", &[]));
    d
}

/// Baseline JPEG skeleton: SOI, APP0 JFIF, SOF0 (8x8), SOS, scan data with
/// a stuffed byte and a restart marker, EOI.
pub fn jpeg() -> Vec<u8> {
    let mut d = vec![0xFF, 0xD8];
    d.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    d.extend_from_slice(b"JFIF\0");
    d.extend_from_slice(&[1, 2, 0, 0, 1, 0, 1, 0, 0]);
    d.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 8, 0x00, 0x08, 0x00, 0x08, 1, 1, 0x11, 0]);
    d.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 1, 1, 0, 0, 0x3F, 0]);
    d.extend_from_slice(&[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]);
    d.extend_from_slice(&[0xFF, 0xD9]);
    d
}

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

/// `ftyp`, `moov` containing `mvhd` and a `trak`, then `mdat`.
pub fn mp4() -> Vec<u8> {
    let mut mvhd = vec![0u8; 12];
    mvhd.extend_from_slice(&600u32.to_be_bytes());
    mvhd.extend_from_slice(&1200u32.to_be_bytes());
    let trak = mp4_box(b"trak", &mp4_box(b"tkhd", &[0u8; 20]));
    let mut moov = mp4_box(b"mvhd", &mvhd);
    moov.extend(trak);

    let mut d = mp4_box(b"ftyp", b"mp42\0\0\0\0mp42isom");
    d.extend(mp4_box(b"moov", &moov));
    d.extend(mp4_box(b"mdat", &[0x5A; 64]));
    d
}
