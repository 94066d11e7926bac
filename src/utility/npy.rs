// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Minimal NumPy `.npy` (format 1.0) writer
//!
//! Only what trace downloads need: a one-dimensional structured array whose
//! fields are all little-endian `f64`. The result loads with
//! `numpy.load(path)` and exposes the fields by name, e.g.
//! `trace["wavelengths"]`.

use anyhow::{bail, Result};

const MAGIC: &[u8] = b"\x93NUMPY";
const VERSION: [u8; 2] = [1, 0];
/// Header plus preamble is padded to a multiple of this.
const ALIGNMENT: usize = 64;

/// Encode equal-length columns as a structured array of `<f8` fields.
///
/// Records are interleaved: row `i` holds `fields[0].1[i]`, `fields[1].1[i]`
/// and so on.
pub fn write_structured_f64(fields: &[(&str, &[f64])]) -> Result<Vec<u8>> {
    let Some((_, first)) = fields.first() else {
        bail!("a structured array needs at least one field");
    };
    let rows = first.len();
    for (name, column) in fields {
        if column.len() != rows {
            bail!(
                "field '{}' has {} values, expected {}",
                name,
                column.len(),
                rows
            );
        }
        if name.is_empty() || name.contains('\'') {
            bail!("invalid field name '{}'", name);
        }
    }

    let descr = fields
        .iter()
        .map(|(name, _)| format!("('{}', '<f8')", name))
        .collect::<Vec<_>>()
        .join(", ");
    let mut header = format!(
        "{{'descr': [{}], 'fortran_order': False, 'shape': ({},), }}",
        descr, rows
    );
    let preamble = MAGIC.len() + VERSION.len() + 2;
    let unpadded = preamble + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let header_len = match u16::try_from(header.len()) {
        Ok(len) => len,
        Err(_) => bail!("npy header too long for format 1.0"),
    };

    let mut out = Vec::with_capacity(preamble + header.len() + rows * fields.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for row in 0..rows {
        for (_, column) in fields {
            out.extend_from_slice(&column[row].to_le_bytes());
        }
    }
    Ok(out)
}
