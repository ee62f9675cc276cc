//! Minimal MATLAB level-5 MAT-file writer: named 1xN real double row vectors,
//! little-endian, uncompressed. Enough for `load('arrdata.mat')` and
//! `scipy.io.loadmat`.

use anyhow::Result;
use bytes::{BufMut, BytesMut};

const HEADER_TEXT_LEN: usize = 116;
const MAT_VERSION: u16 = 0x0100;

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;

const MX_DOUBLE_CLASS: u32 = 6;

fn pad8(n: usize) -> usize {
    (n + 7) & !7
}

/// Encode `vars` as one MAT-file. Names must be valid MATLAB identifiers.
pub fn encode(vars: &[(&str, &[f64])]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(128 + vars.iter().map(|(n, v)| 64 + n.len() + v.len() * 8).sum::<usize>());

    let text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created on: {}",
        std::env::consts::OS,
        time::OffsetDateTime::now_utc()
    );
    let mut header = [b' '; HEADER_TEXT_LEN];
    let n = text.len().min(HEADER_TEXT_LEN);
    header[..n].copy_from_slice(&text.as_bytes()[..n]);
    buf.put_slice(&header);
    buf.put_bytes(0, 8); // subsystem data offset
    buf.put_u16_le(MAT_VERSION);
    buf.put_slice(b"IM");

    for (name, values) in vars {
        check_name(name)?;
        put_double_row(&mut buf, name, values)?;
    }
    Ok(buf.to_vec())
}

fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = chars.next().map_or(false, |c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63;
    anyhow::ensure!(ok, "invalid MATLAB variable name {:?}", name);
    Ok(())
}

fn put_double_row(buf: &mut BytesMut, name: &str, values: &[f64]) -> Result<()> {
    let cols = i32::try_from(values.len())?;
    let name_len = name.len();
    let data_len = values.len() * 8;

    // flags + dims + name + real part, each with its 8-byte tag
    let body = 16 + 16 + (8 + pad8(name_len)) + (8 + data_len);

    buf.put_u32_le(MI_MATRIX);
    buf.put_u32_le(u32::try_from(body)?);

    buf.put_u32_le(MI_UINT32);
    buf.put_u32_le(8);
    buf.put_u32_le(MX_DOUBLE_CLASS);
    buf.put_u32_le(0);

    buf.put_u32_le(MI_INT32);
    buf.put_u32_le(8);
    buf.put_i32_le(1);
    buf.put_i32_le(cols);

    buf.put_u32_le(MI_INT8);
    buf.put_u32_le(name_len as u32);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, pad8(name_len) - name_len);

    buf.put_u32_le(MI_DOUBLE);
    buf.put_u32_le(data_len as u32);
    for v in values {
        buf.put_f64_le(*v);
    }
    Ok(())
}
