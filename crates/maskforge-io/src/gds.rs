//! GDS-II stream writer.
//!
//! The top device is flattened and written as a single structure: one
//! BOUNDARY per polygon and one TEXT per annotation. Coordinates are
//! rounded to a 1 nm database grid with a 1 µm user unit.
//!
//! Each record: [2-byte length][2-byte record type][payload], big-endian.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use maskforge_core::{Annotation, DeviceId, Layout, LayoutError, Point, Polygon};

mod record_type {
    pub const HEADER: u16 = 0x0002;
    pub const BGNLIB: u16 = 0x0102;
    pub const LIBNAME: u16 = 0x0206;
    pub const UNITS: u16 = 0x0305;
    pub const ENDLIB: u16 = 0x0400;
    pub const BGNSTR: u16 = 0x0502;
    pub const STRNAME: u16 = 0x0606;
    pub const ENDSTR: u16 = 0x0700;
    pub const BOUNDARY: u16 = 0x0800;
    pub const TEXT: u16 = 0x0C00;
    pub const LAYER: u16 = 0x0D02;
    pub const DATATYPE: u16 = 0x0E02;
    pub const XY: u16 = 0x1003;
    pub const ENDEL: u16 = 0x1100;
    pub const TEXTTYPE: u16 = 0x1602;
    pub const STRING: u16 = 0x1906;
}

/// Largest vertex count a BOUNDARY can hold: the closed XY list must fit a
/// 16-bit record length.
pub const MAX_BOUNDARY_VERTICES: usize = 8190;

const MAX_RECORD_PAYLOAD: usize = u16::MAX as usize - 4;

#[derive(Error, Debug)]
pub enum GdsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Coordinate {value} µm does not fit the 32-bit database grid")]
    CoordinateOverflow { value: f64 },

    #[error("Polygon on layer {layer} has {count} vertices; GDS-II allows at most {max}")]
    TooManyVertices { layer: String, count: usize, max: usize },

    #[error("Layer number {value} exceeds the GDS-II limit of {max}")]
    LayerOutOfRange { value: u16, max: i16 },

    #[error("Record payload of {0} bytes exceeds the GDS-II record limit")]
    RecordTooLong(usize),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Encode an f64 as a GDS-II excess-64 base-16 real.
fn f64_to_gds_real8(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0u8; 8];
    }
    let sign_bit: u8 = if value < 0.0 { 0x80 } else { 0x00 };
    let mut mantissa = value.abs();
    let mut exponent: i32 = 0;
    while mantissa >= 1.0 && exponent < 63 {
        mantissa /= 16.0;
        exponent += 1;
    }
    while mantissa < 1.0 / 16.0 && exponent > -64 {
        mantissa *= 16.0;
        exponent -= 1;
    }
    let bits = (mantissa * (1u64 << 56) as f64).round() as u64;
    let mut out = bits.to_be_bytes();
    out[0] = sign_bit | ((exponent + 64) as u8 & 0x7F);
    out
}

/// Layer, datatype and texttype numbers are signed 16-bit in the stream.
fn layer_number(value: u16) -> Result<i16, GdsError> {
    i16::try_from(value).map_err(|_| GdsError::LayerOutOfRange {
        value,
        max: i16::MAX,
    })
}

/// Writes a flattened layout to any byte sink.
pub struct GdsWriter<W: Write> {
    writer: W,
    /// Database unit in user units (µm).
    db_unit_in_um: f64,
    /// Modification and access time written to BGNLIB/BGNSTR:
    /// year, month, day, hour, minute, second.
    timestamp: [i16; 6],
}

impl<W: Write> GdsWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            db_unit_in_um: 0.001,
            timestamp: [2026, 1, 1, 0, 0, 0],
        }
    }

    pub fn with_timestamp(mut self, timestamp: [i16; 6]) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Write `top` and everything under it as one structure named after it.
    pub fn write(&mut self, layout: &Layout, top: DeviceId) -> Result<(), GdsError> {
        let name = layout.device(top)?.name.clone();
        let polygons = layout.flatten(top)?;
        let annotations = layout.flatten_annotations(top)?;

        self.write_i16_record(record_type::HEADER, &[600])?;
        let stamp = self.double_timestamp();
        self.write_i16_record(record_type::BGNLIB, &stamp)?;
        self.write_string_record(record_type::LIBNAME, &layout.name)?;
        self.write_real8_record(
            record_type::UNITS,
            &[self.db_unit_in_um, self.db_unit_in_um * 1e-6],
        )?;

        self.write_i16_record(record_type::BGNSTR, &stamp)?;
        self.write_string_record(record_type::STRNAME, &name)?;
        let mut written = 0;
        for polygon in &polygons {
            if polygon.vertex_count() < 3 {
                log::warn!("Skipping polygon with {} vertices", polygon.vertex_count());
                continue;
            }
            self.write_boundary(polygon)?;
            written += 1;
        }
        for annotation in &annotations {
            self.write_text(annotation)?;
        }
        self.write_record(record_type::ENDSTR, &[])?;
        self.write_record(record_type::ENDLIB, &[])?;
        self.writer.flush()?;

        log::info!(
            "Wrote structure '{}': {} boundaries, {} text labels",
            name,
            written,
            annotations.len()
        );
        Ok(())
    }

    fn double_timestamp(&self) -> [i16; 12] {
        let mut stamp = [0i16; 12];
        stamp[..6].copy_from_slice(&self.timestamp);
        stamp[6..].copy_from_slice(&self.timestamp);
        stamp
    }

    fn to_grid(&self, value: f64) -> Result<i32, GdsError> {
        let scaled = (value / self.db_unit_in_um).round();
        if !scaled.is_finite() || scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
            return Err(GdsError::CoordinateOverflow { value });
        }
        Ok(scaled as i32)
    }

    fn xy(&self, points: impl IntoIterator<Item = Point>) -> Result<Vec<i32>, GdsError> {
        let mut coords = Vec::new();
        for p in points {
            coords.push(self.to_grid(p.x)?);
            coords.push(self.to_grid(p.y)?);
        }
        Ok(coords)
    }

    fn write_boundary(&mut self, polygon: &Polygon) -> Result<(), GdsError> {
        let count = polygon.vertex_count();
        if count > MAX_BOUNDARY_VERTICES {
            return Err(GdsError::TooManyVertices {
                layer: polygon.layer.to_string(),
                count,
                max: MAX_BOUNDARY_VERTICES,
            });
        }
        let closed = polygon
            .vertices
            .iter()
            .chain(polygon.vertices.first())
            .copied();
        let coords = self.xy(closed)?;
        let layer = layer_number(polygon.layer.layer)?;
        let datatype = layer_number(polygon.layer.datatype)?;

        self.write_record(record_type::BOUNDARY, &[])?;
        self.write_i16_record(record_type::LAYER, &[layer])?;
        self.write_i16_record(record_type::DATATYPE, &[datatype])?;
        self.write_i32_record(record_type::XY, &coords)?;
        self.write_record(record_type::ENDEL, &[])
    }

    fn write_text(&mut self, annotation: &Annotation) -> Result<(), GdsError> {
        let coords = self.xy([annotation.position])?;
        let layer = layer_number(annotation.layer.layer)?;
        let texttype = layer_number(annotation.layer.datatype)?;
        self.write_record(record_type::TEXT, &[])?;
        self.write_i16_record(record_type::LAYER, &[layer])?;
        self.write_i16_record(record_type::TEXTTYPE, &[texttype])?;
        self.write_i32_record(record_type::XY, &coords)?;
        self.write_string_record(record_type::STRING, &annotation.text)?;
        self.write_record(record_type::ENDEL, &[])
    }

    fn write_record(&mut self, record_type: u16, data: &[u8]) -> Result<(), GdsError> {
        if data.len() > MAX_RECORD_PAYLOAD {
            return Err(GdsError::RecordTooLong(data.len()));
        }
        let total_len = (data.len() + 4) as u16;
        self.writer.write_all(&total_len.to_be_bytes())?;
        self.writer.write_all(&record_type.to_be_bytes())?;
        self.writer.write_all(data)?;
        Ok(())
    }

    fn write_i16_record(&mut self, record_type: u16, values: &[i16]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_i32_record(&mut self, record_type: u16, values: &[i32]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_string_record(&mut self, record_type: u16, s: &str) -> Result<(), GdsError> {
        let mut data = s.as_bytes().to_vec();
        // Strings are padded to an even length.
        if data.len() % 2 != 0 {
            data.push(0);
        }
        self.write_record(record_type, &data)
    }

    fn write_real8_record(&mut self, record_type: u16, values: &[f64]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| f64_to_gds_real8(*v)).collect();
        self.write_record(record_type, &data)
    }
}

/// Write `top` to a `.gds` file, replacing it if it exists.
pub fn write_gds(layout: &Layout, top: DeviceId, path: impl AsRef<Path>) -> Result<(), GdsError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    GdsWriter::new(BufWriter::new(file)).write(layout, top)?;
    log::info!("Saved {}", path.display());
    Ok(())
}
