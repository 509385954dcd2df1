//! GeoTIFF rasters decoded with the `tiff` crate.
//!
//! Only the header is read on open. Pixels are decoded one strip or tile at
//! a time from byte ranges of the object, and reduced-resolution image
//! directories are exposed as overviews. Georeferencing comes from the
//! GeoTIFF tags of the first image:
//!
//! | Tag   | Name                  | Use                               |
//! |-------|-----------------------|-----------------------------------|
//! | 33550 | ModelPixelScale       | pixel size                        |
//! | 33922 | ModelTiepoint         | origin (with pixel scale)         |
//! | 34264 | ModelTransformation   | origin and pixel size (north-up)  |
//! | 34735 | GeoKeyDirectory       | EPSG code, raster type            |
//! | 42113 | GDAL_NODATA           | nodata value (ASCII)              |

use std::io::{self, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tokio::runtime::Handle;
use tracing::debug;

use super::{
    check_read, DataType, GeoTransform, PixelWindow, RasterAccess, RasterDataset, RasterMetadata,
    RasterRegion,
};
use crate::error::RasterError;
use crate::geo::{Crs, EPSG_WGS84};
use crate::io::{BlockCache, Location, ObjectFetcher, RangeReader};

// Baseline TIFF tags
const NEW_SUBFILE_TYPE: u16 = 254;
const BITS_PER_SAMPLE: u16 = 258;
const SAMPLES_PER_PIXEL: u16 = 277;
const PLANAR_CONFIGURATION: u16 = 284;
const SAMPLE_FORMAT: u16 = 339;

// GeoTIFF tags
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// GeoKeys
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

// ExtraSamples values marking alpha
const EXTRA_SAMPLE_ASSOCIATED_ALPHA: u16 = 1;
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

// NewSubfileType bits
const SUBFILE_REDUCED_RESOLUTION: u32 = 1;
const SUBFILE_TRANSPARENCY_MASK: u32 = 4;

const PLANAR_SEPARATE: u16 = 2;

/// Bytes fetched ahead of each uncached read of the TIFF structure.
const READ_AHEAD: usize = 64 * 1024;

/// Decoded strips or tiles kept per dataset.
const CHUNK_CACHE_CAPACITY: usize = 64;

// =============================================================================
// Sample storage
// =============================================================================

/// Decoded samples, pixel-interleaved, in their native type.
enum SampleBuffer {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleBuffer {
    fn from_decoded(result: DecodingResult) -> Result<(Self, DataType), RasterError> {
        Ok(match result {
            DecodingResult::U8(v) => (SampleBuffer::U8(v), DataType::UInt8),
            DecodingResult::I8(v) => (SampleBuffer::I8(v), DataType::Int8),
            DecodingResult::U16(v) => (SampleBuffer::U16(v), DataType::UInt16),
            DecodingResult::I16(v) => (SampleBuffer::I16(v), DataType::Int16),
            DecodingResult::U32(v) => (SampleBuffer::U32(v), DataType::UInt32),
            DecodingResult::I32(v) => (SampleBuffer::I32(v), DataType::Int32),
            DecodingResult::F32(v) => (SampleBuffer::F32(v), DataType::Float32),
            DecodingResult::F64(v) => (SampleBuffer::F64(v), DataType::Float64),
            _ => {
                return Err(RasterError::Decode(
                    "64-bit integer samples are not supported".to_string(),
                ))
            }
        })
    }

    fn len(&self) -> usize {
        match self {
            SampleBuffer::U8(v) => v.len(),
            SampleBuffer::I8(v) => v.len(),
            SampleBuffer::U16(v) => v.len(),
            SampleBuffer::I16(v) => v.len(),
            SampleBuffer::U32(v) => v.len(),
            SampleBuffer::I32(v) => v.len(),
            SampleBuffer::F32(v) => v.len(),
            SampleBuffer::F64(v) => v.len(),
        }
    }

    #[inline]
    fn get(&self, index: usize) -> f64 {
        match self {
            SampleBuffer::U8(v) => f64::from(v[index]),
            SampleBuffer::I8(v) => f64::from(v[index]),
            SampleBuffer::U16(v) => f64::from(v[index]),
            SampleBuffer::I16(v) => f64::from(v[index]),
            SampleBuffer::U32(v) => f64::from(v[index]),
            SampleBuffer::I32(v) => f64::from(v[index]),
            SampleBuffer::F32(v) => f64::from(v[index]),
            SampleBuffer::F64(v) => v[index],
        }
    }
}

// =============================================================================
// Byte source
// =============================================================================

/// Where the TIFF bytes come from.
#[derive(Clone)]
enum TiffSource {
    Memory(Bytes),
    /// Range reads driven on `runtime`; only usable from blocking threads.
    Remote {
        reader: Arc<dyn RangeReader>,
        runtime: Handle,
    },
}

impl TiffSource {
    fn size(&self) -> u64 {
        match self {
            TiffSource::Memory(bytes) => bytes.len() as u64,
            TiffSource::Remote { reader, .. } => reader.size(),
        }
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        match self {
            TiffSource::Memory(bytes) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX);
                match start.checked_add(len) {
                    Some(end) if end <= bytes.len() => Ok(bytes.slice(start..end)),
                    _ => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                }
            }
            TiffSource::Remote { reader, runtime } => runtime
                .block_on(reader.read_exact_at(offset, len))
                .map_err(io::Error::other),
        }
    }
}

/// `Read + Seek` view of a [`TiffSource`] for the decoder.
struct SourceCursor {
    source: TiffSource,
    position: u64,
    buffer: Bytes,
    buffer_start: u64,
}

impl SourceCursor {
    fn new(source: TiffSource) -> Self {
        Self {
            source,
            position: 0,
            buffer: Bytes::new(),
            buffer_start: 0,
        }
    }

    fn is_buffered(&self, position: u64) -> bool {
        position >= self.buffer_start && position - self.buffer_start < self.buffer.len() as u64
    }
}

impl Read for SourceCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.source.size();
        if buf.is_empty() || self.position >= size {
            return Ok(0);
        }

        if !self.is_buffered(self.position) {
            let len = (buf.len().max(READ_AHEAD) as u64).min(size - self.position) as usize;
            self.buffer = self.source.read_at(self.position, len)?;
            self.buffer_start = self.position;
        }

        let start = (self.position - self.buffer_start) as usize;
        let n = buf.len().min(self.buffer.len() - start);
        buf[..n].copy_from_slice(&self.buffer[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for SourceCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.source.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of object")
        })?;
        Ok(self.position)
    }
}

type TiffDecoder = Decoder<SourceCursor>;

fn decode_err(e: tiff::TiffError) -> RasterError {
    RasterError::Decode(e.to_string())
}

// =============================================================================
// Dataset
// =============================================================================

/// Strip or tile layout of one image directory.
#[derive(Debug, Clone, Copy)]
struct Level {
    ifd: usize,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
}

impl Level {
    fn read(decoder: &TiffDecoder, ifd: usize, width: usize) -> Self {
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunk_width = (chunk_width as usize).max(1);
        Self {
            ifd,
            chunk_width,
            chunk_height: (chunk_height as usize).max(1),
            chunks_across: width.div_ceil(chunk_width),
        }
    }
}

/// A decoded strip or tile. Rows are `width` samples apart.
struct Chunk {
    width: usize,
    height: usize,
    samples: SampleBuffer,
}

/// A GeoTIFF read lazily from its byte source.
///
/// Level 0 is the full resolution image; level `i + 1` is overview `i`.
pub struct GeoTiffDataset {
    source: TiffSource,
    metadata: RasterMetadata,
    overviews: Vec<RasterMetadata>,
    levels: Vec<Level>,
    chunks: Mutex<LruCache<(usize, usize), Arc<Chunk>>>,
}

impl GeoTiffDataset {
    /// Decode a GeoTIFF held in memory.
    ///
    /// # Errors
    /// `Decode` for unreadable TIFF data, `Georeference` when the image has
    /// no usable transform, `UnsupportedCrs` for user-defined CRSs.
    pub fn decode(bytes: impl Into<Bytes>) -> Result<Self, RasterError> {
        Self::open(TiffSource::Memory(bytes.into()))
    }

    /// Read the image directories of `source`. No pixel data is decoded.
    fn open(source: TiffSource) -> Result<Self, RasterError> {
        let mut decoder = Decoder::new(SourceCursor::new(source.clone()))
            .map_err(decode_err)?
            .with_limits(Limits::unlimited());

        let (width, height) = dimensions(&mut decoder)?;
        let (band_count, data_type) = read_sample_layout(&mut decoder)?;

        let alpha_band = decoder
            .find_tag(Tag::ExtraSamples)
            .map_err(decode_err)?
            .map(|v| v.into_u16_vec())
            .transpose()
            .map_err(decode_err)?
            .and_then(|extra| {
                let first_extra = band_count.checked_sub(extra.len())?;
                extra
                    .iter()
                    .position(|s| {
                        *s == EXTRA_SAMPLE_ASSOCIATED_ALPHA || *s == EXTRA_SAMPLE_UNASSOCIATED_ALPHA
                    })
                    .map(|p| first_extra + p)
            });

        let transform = read_transform(&mut decoder)?;
        let crs = read_crs(&mut decoder)?;
        let nodata = read_nodata(&mut decoder)?;

        let metadata = RasterMetadata {
            width,
            height,
            band_count,
            data_type,
            transform,
            crs,
            nodata,
            alpha_band,
        };

        let full = Level::read(&decoder, 0, width);
        let mut reduced = Vec::new();
        let mut ifd = 0;
        while decoder.more_images() {
            ifd += 1;
            if let Err(e) = decoder.next_image() {
                debug!(ifd, error = %e, "Stopping at unreadable image directory");
                break;
            }
            let subfile = find_tag(&mut decoder, NEW_SUBFILE_TYPE)?
                .map(|v| v.into_u32())
                .transpose()
                .map_err(decode_err)?
                .unwrap_or(0);
            if subfile & SUBFILE_REDUCED_RESOLUTION == 0 || subfile & SUBFILE_TRANSPARENCY_MASK != 0
            {
                continue;
            }
            if read_sample_layout(&mut decoder)? != (band_count, data_type) {
                debug!(ifd, "Skipping overview with a different sample layout");
                continue;
            }
            let (w, h) = dimensions(&mut decoder)?;
            if w >= width {
                continue;
            }
            reduced.push((metadata.overview(w, h), Level::read(&decoder, ifd, w)));
        }
        reduced.sort_by(|a, b| b.0.width.cmp(&a.0.width));

        let mut levels = vec![full];
        let mut overviews = Vec::with_capacity(reduced.len());
        for (overview, level) in reduced {
            overviews.push(overview);
            levels.push(level);
        }

        debug!(
            width,
            height,
            bands = band_count,
            dtype = %data_type,
            overviews = overviews.len(),
            "Opened GeoTIFF"
        );

        Ok(Self {
            source,
            metadata,
            overviews,
            levels,
            chunks: Mutex::new(LruCache::new(
                NonZeroUsize::new(CHUNK_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    fn level_metadata(&self, level: usize) -> &RasterMetadata {
        match level {
            0 => &self.metadata,
            _ => &self.overviews[level - 1],
        }
    }

    /// A decoder positioned on the image directory of `level`.
    fn decoder_at(&self, level: usize) -> Result<TiffDecoder, RasterError> {
        let mut decoder = Decoder::new(SourceCursor::new(self.source.clone()))
            .map_err(decode_err)?
            .with_limits(Limits::unlimited());
        let ifd = self.levels[level].ifd;
        if ifd > 0 {
            decoder.seek_to_image(ifd).map_err(decode_err)?;
        }
        Ok(decoder)
    }

    fn chunk(
        &self,
        level: usize,
        index: usize,
        decoder: &mut Option<TiffDecoder>,
    ) -> Result<Arc<Chunk>, RasterError> {
        let key = (level, index);
        if let Some(chunk) = self
            .chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(chunk.clone());
        }

        let decoder = match decoder {
            Some(decoder) => decoder,
            slot @ None => slot.insert(self.decoder_at(level)?),
        };
        let chunk_index = u32::try_from(index)
            .map_err(|_| RasterError::Decode(format!("chunk index {} overflows", index)))?;
        let (data_width, data_height) = decoder.chunk_data_dimensions(chunk_index);
        let (samples, data_type) =
            SampleBuffer::from_decoded(decoder.read_chunk(chunk_index).map_err(decode_err)?)?;
        if data_type != self.metadata.data_type {
            return Err(RasterError::Decode(format!(
                "chunk {} of level {} decoded as {}, expected {}",
                index, level, data_type, self.metadata.data_type
            )));
        }

        // Edge tiles come back either cropped or padded to the full tile
        let layout = self.levels[level];
        let spp = self.metadata.band_count;
        let (width, height) = [
            (data_width as usize, data_height as usize),
            (layout.chunk_width, layout.chunk_height),
        ]
        .into_iter()
        .find(|(w, h)| w * h * spp == samples.len())
        .ok_or_else(|| {
            RasterError::Decode(format!(
                "chunk {} of level {} has {} samples for a {}x{} chunk with {} bands",
                index,
                level,
                samples.len(),
                data_width,
                data_height,
                spp
            ))
        })?;

        let chunk = Arc::new(Chunk {
            width,
            height,
            samples,
        });
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, chunk.clone());
        Ok(chunk)
    }

    fn read_level(
        &self,
        level: usize,
        window: &PixelWindow,
        bands: &[usize],
    ) -> Result<RasterRegion, RasterError> {
        check_read(self.level_metadata(level), window, bands)?;

        let layout = self.levels[level];
        let spp = self.metadata.band_count;
        let (col_end, row_end) = (window.col_off + window.width, window.row_off + window.height);
        let mut data = vec![0.0; bands.len() * window.width * window.height];
        let mut decoder = None;

        for chunk_row in window.row_off / layout.chunk_height..=(row_end - 1) / layout.chunk_height {
            for chunk_col in
                window.col_off / layout.chunk_width..=(col_end - 1) / layout.chunk_width
            {
                let index = chunk_row * layout.chunks_across + chunk_col;
                let chunk = self.chunk(level, index, &mut decoder)?;

                let (left, top) = (chunk_col * layout.chunk_width, chunk_row * layout.chunk_height);
                let cols = window.col_off.max(left)..col_end.min(left + chunk.width);
                let rows = window.row_off.max(top)..row_end.min(top + chunk.height);

                for (i, &band) in bands.iter().enumerate() {
                    for row in rows.clone() {
                        let out = (i * window.height + row - window.row_off) * window.width;
                        let src = (row - top) * chunk.width;
                        for col in cols.clone() {
                            data[out + col - window.col_off] =
                                chunk.samples.get((src + col - left) * spp + band);
                        }
                    }
                }
            }
        }

        Ok(RasterRegion {
            window: *window,
            band_count: bands.len(),
            data,
        })
    }
}

impl RasterDataset for GeoTiffDataset {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn overviews(&self) -> &[RasterMetadata] {
        &self.overviews
    }

    fn read_region(
        &self,
        window: &PixelWindow,
        bands: &[usize],
    ) -> Result<RasterRegion, RasterError> {
        self.read_level(0, window, bands)
    }

    fn read_overview_region(
        &self,
        overview: usize,
        window: &PixelWindow,
        bands: &[usize],
    ) -> Result<RasterRegion, RasterError> {
        if overview >= self.overviews.len() {
            return Err(RasterError::OverviewOutOfRange {
                overview,
                count: self.overviews.len(),
            });
        }
        self.read_level(overview + 1, window, bands)
    }
}

fn dimensions<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<(usize, usize), RasterError> {
    let (width, height) = decoder.dimensions().map_err(decode_err)?;
    Ok((width as usize, height as usize))
}

/// Band count and sample type of the current image directory.
fn read_sample_layout<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Result<(usize, DataType), RasterError> {
    let mut first = |code: u16| -> Result<Option<u16>, RasterError> {
        Ok(decoder
            .find_tag_unsigned_vec::<u16>(Tag::from_u16_exhaustive(code))
            .map_err(decode_err)?
            .and_then(|values| values.first().copied()))
    };

    let band_count = first(SAMPLES_PER_PIXEL)?.unwrap_or(1) as usize;
    let bits = first(BITS_PER_SAMPLE)?.unwrap_or(1);
    let format = first(SAMPLE_FORMAT)?.unwrap_or(1);

    if first(PLANAR_CONFIGURATION)? == Some(PLANAR_SEPARATE) {
        return Err(RasterError::Decode(
            "band-separate (planar) TIFFs are not supported".to_string(),
        ));
    }

    let data_type = match (format, bits) {
        (1, 8) => DataType::UInt8,
        (2, 8) => DataType::Int8,
        (1, 16) => DataType::UInt16,
        (2, 16) => DataType::Int16,
        (1, 32) => DataType::UInt32,
        (2, 32) => DataType::Int32,
        (3, 32) => DataType::Float32,
        (3, 64) => DataType::Float64,
        _ => {
            return Err(RasterError::Decode(format!(
                "unsupported sample type: {} bits with SampleFormat {}",
                bits, format
            )))
        }
    };
    Ok((band_count, data_type))
}

fn find_tag<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> Result<Option<tiff::decoder::ifd::Value>, RasterError> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))
        .map_err(decode_err)
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform, RasterError> {
    let as_f64s = |value: tiff::decoder::ifd::Value| {
        value
            .into_f64_vec()
            .map_err(|e| RasterError::Georeference(e.to_string()))
    };

    let raster_type = read_geo_keys(decoder)?
        .iter()
        .find(|(key, _)| *key == GT_RASTER_TYPE_GEO_KEY)
        .map(|(_, value)| *value);

    let mut transform = if let Some(matrix) = find_tag(decoder, MODEL_TRANSFORMATION)? {
        let m = as_f64s(matrix)?;
        if m.len() < 8 {
            return Err(RasterError::Georeference(
                "ModelTransformation has fewer than 8 values".to_string(),
            ));
        }
        if m[1] != 0.0 || m[4] != 0.0 {
            return Err(RasterError::Georeference(
                "rotated rasters are not supported".to_string(),
            ));
        }
        GeoTransform::new(m[3], m[7], m[0], -m[5])
    } else {
        let scale = find_tag(decoder, MODEL_PIXEL_SCALE)?
            .map(as_f64s)
            .transpose()?
            .ok_or_else(|| RasterError::Georeference("missing ModelPixelScale".to_string()))?;
        let tiepoint = find_tag(decoder, MODEL_TIEPOINT)?
            .map(as_f64s)
            .transpose()?
            .ok_or_else(|| RasterError::Georeference("missing ModelTiepoint".to_string()))?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(RasterError::Georeference(
                "malformed ModelPixelScale or ModelTiepoint".to_string(),
            ));
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        GeoTransform::new(x - i * scale[0], y + j * scale[1], scale[0], scale[1])
    };

    transform.validate()?;

    // Tie points refer to pixel centres
    if raster_type == Some(RASTER_PIXEL_IS_POINT) {
        transform.origin_x -= transform.res_x / 2.0;
        transform.origin_y += transform.res_y / 2.0;
    }

    Ok(transform)
}

/// `(key, value)` pairs of the GeoKeyDirectory stored inline.
fn read_geo_keys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<(u16, u16)>, RasterError> {
    let Some(directory) = find_tag(decoder, GEO_KEY_DIRECTORY)? else {
        return Ok(Vec::new());
    };
    let directory = directory
        .into_u16_vec()
        .map_err(|e| RasterError::Georeference(e.to_string()))?;

    // Header: version, revision, minor revision, number of keys
    let Some(&count) = directory.get(3) else {
        return Ok(Vec::new());
    };

    Ok(directory[4..]
        .chunks_exact(4)
        .take(count as usize)
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect())
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Crs, RasterError> {
    let keys = read_geo_keys(decoder)?;
    let lookup = |wanted: u16| {
        keys.iter()
            .find(|(key, _)| *key == wanted)
            .map(|(_, value)| *value)
    };

    let code = lookup(PROJECTED_CS_TYPE_GEO_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_GEO_KEY));
    match code {
        Some(USER_DEFINED) => Err(RasterError::UnsupportedCrs(
            "user-defined coordinate system".to_string(),
        )),
        Some(code) => Ok(Crs::from_epsg(code)),
        None => {
            debug!("GeoTIFF has no CRS key, assuming EPSG:{}", EPSG_WGS84);
            Ok(Crs::Wgs84)
        }
    }
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>, RasterError> {
    let Some(value) = find_tag(decoder, GDAL_NODATA)? else {
        return Ok(None);
    };
    let text = value
        .into_string()
        .map_err(|e| RasterError::Decode(e.to_string()))?;
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match text.to_ascii_lowercase().as_str() {
        "nan" => Ok(Some(f64::NAN)),
        other => other
            .parse::<f64>()
            .map(Some)
            .map_err(|_| RasterError::Decode(format!("invalid GDAL_NODATA value '{}'", text))),
    }
}

// =============================================================================
// Access
// =============================================================================

/// Opens GeoTIFF assets from any location an [`ObjectFetcher`] can read.
///
/// Each dataset reads its object through its own [`BlockCache`], so the
/// header and recently used strips or tiles are fetched once.
#[derive(Clone)]
pub struct GeoTiffAccess {
    fetcher: ObjectFetcher,
}

impl GeoTiffAccess {
    pub fn new(fetcher: ObjectFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl RasterAccess for GeoTiffAccess {
    type Dataset = GeoTiffDataset;

    async fn open(&self, href: &str) -> Result<GeoTiffDataset, RasterError> {
        let location = Location::parse(href)?;
        let reader = self.fetcher.range_reader(&location).await?;
        debug!(href = %href, size = reader.size(), "Reading GeoTIFF header");

        let source = TiffSource::Remote {
            reader: Arc::new(BlockCache::new(reader)),
            runtime: Handle::current(),
        };
        tokio::task::spawn_blocking(move || GeoTiffDataset::open(source))
            .await
            .map_err(|e| RasterError::Decode(format!("decode task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tiff::encoder::colortype::Gray16;
    use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};

    fn georeference<W: std::io::Write + Seek, K: TiffKind>(
        dir: &mut DirectoryEncoder<'_, W, K>,
        origin: (f64, f64),
        res: f64,
        nodata: Option<&str>,
    ) {
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &[res, res, 0.0][..])
            .unwrap();
        dir.write_tag(
            Tag::Unknown(MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, origin.0, origin.1, 0.0][..],
        )
        .unwrap();
        let keys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326];
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &keys[..])
            .unwrap();
        if let Some(nodata) = nodata {
            dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata).unwrap();
        }
    }

    /// Encode a single-band u16 GeoTIFF in EPSG:4326.
    fn geotiff(
        width: u32,
        height: u32,
        data: &[u16],
        origin: (f64, f64),
        res: f64,
        nodata: Option<&str>,
    ) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
        let mut image = encoder.new_image::<Gray16>(width, height).unwrap();
        georeference(image.encoder(), origin, res, nodata);
        image.write_data(data).unwrap();
        buffer.into_inner()
    }

    /// 8x8 image of 1s followed by a 2x2 overview of 3s, a 4x4 mask and a
    /// 4x4 overview of 2s, one row per strip.
    fn pyramid() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();

        let mut image = encoder.new_image::<Gray16>(8, 8).unwrap();
        georeference(image.encoder(), (0.0, 8.0), 1.0, None);
        image.rows_per_strip(1).unwrap();
        image.write_data(&[1u16; 64]).unwrap();

        for (size, value, subfile) in [
            (2, 3u16, SUBFILE_REDUCED_RESOLUTION),
            (4, 0, SUBFILE_REDUCED_RESOLUTION | SUBFILE_TRANSPARENCY_MASK),
            (4, 2, SUBFILE_REDUCED_RESOLUTION),
        ] {
            let mut image = encoder.new_image::<Gray16>(size, size).unwrap();
            image
                .encoder()
                .write_tag(Tag::Unknown(NEW_SUBFILE_TYPE), subfile)
                .unwrap();
            image.rows_per_strip(1).unwrap();
            image
                .write_data(&vec![value; (size * size) as usize])
                .unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_decode_georeferenced_tiff() {
        let data: Vec<u16> = (0..20).collect();
        let bytes = geotiff(5, 4, &data, (-10.0, 10.0), 4.0, Some("0"));
        let dataset = GeoTiffDataset::decode(bytes).unwrap();

        let meta = dataset.metadata();
        assert_eq!((meta.width, meta.height, meta.band_count), (5, 4, 1));
        assert_eq!(meta.data_type, DataType::UInt16);
        assert_eq!(meta.crs, Crs::Wgs84);
        assert_eq!(meta.nodata, Some(0.0));
        assert_eq!(meta.alpha_band, None);
        assert_eq!(
            meta.bounds(),
            crate::geo::BoundingBox::new(-10.0, -6.0, 10.0, 10.0)
        );
        assert!(dataset.overviews().is_empty());

        let region = dataset
            .read_region(&PixelWindow::new(1, 2, 3, 1), &[0])
            .unwrap();
        assert_eq!(region.data, vec![11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_window_spans_strips() {
        let data: Vec<u16> = (0..30).collect();
        let mut buffer = Cursor::new(Vec::new());
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
        let mut image = encoder.new_image::<Gray16>(6, 5).unwrap();
        georeference(image.encoder(), (0.0, 5.0), 1.0, None);
        image.rows_per_strip(2).unwrap();
        image.write_data(&data).unwrap();

        let dataset = GeoTiffDataset::decode(buffer.into_inner()).unwrap();
        assert_eq!(dataset.levels[0].chunk_height, 2);

        // Rows 1..4 touch all three strips, the last one short
        let region = dataset
            .read_region(&PixelWindow::new(2, 1, 3, 4), &[0])
            .unwrap();
        let expected: Vec<f64> = (1..5)
            .flat_map(|row| (2..5).map(move |col| (row * 6 + col) as f64))
            .collect();
        assert_eq!(region.data, expected);

        // Decoded strips are reused
        assert_eq!(dataset.chunks.lock().unwrap().len(), 3);
        dataset
            .read_region(&PixelWindow::new(0, 4, 6, 1), &[0])
            .unwrap();
        assert_eq!(dataset.chunks.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_reduced_resolution_directories_become_overviews() {
        let dataset = GeoTiffDataset::decode(pyramid()).unwrap();

        let overviews = dataset.overviews();
        assert_eq!(
            overviews
                .iter()
                .map(|o| (o.width, o.height))
                .collect::<Vec<_>>(),
            vec![(4, 4), (2, 2)]
        );
        assert_eq!(overviews[0].transform, GeoTransform::new(0.0, 8.0, 2.0, 2.0));
        assert_eq!(overviews[1].bounds(), dataset.metadata().bounds());
        assert_eq!(dataset.metadata().decimation(&overviews[1]), 4.0);

        let full = dataset
            .read_region(&PixelWindow::new(0, 0, 8, 8), &[0])
            .unwrap();
        assert!(full.data.iter().all(|v| *v == 1.0));

        let finer = dataset
            .read_overview_region(0, &PixelWindow::new(1, 1, 3, 3), &[0])
            .unwrap();
        assert_eq!(finer.data, vec![2.0; 9]);

        let coarser = dataset
            .read_overview_region(1, &PixelWindow::new(0, 0, 2, 2), &[0])
            .unwrap();
        assert_eq!(coarser.data, vec![3.0; 4]);

        assert!(matches!(
            dataset.read_overview_region(2, &PixelWindow::new(0, 0, 1, 1), &[0]),
            Err(RasterError::OverviewOutOfRange {
                overview: 2,
                count: 2
            })
        ));
        assert!(matches!(
            dataset.read_overview_region(1, &PixelWindow::new(0, 0, 3, 3), &[0]),
            Err(RasterError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_missing_georeference() {
        let mut buffer = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buffer)
            .unwrap()
            .write_image::<Gray16>(2, 2, &[1, 2, 3, 4])
            .unwrap();
        assert!(matches!(
            GeoTiffDataset::decode(buffer.into_inner()),
            Err(RasterError::Georeference(_))
        ));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            GeoTiffDataset::decode(&b"definitely not a tiff"[..]),
            Err(RasterError::Decode(_))
        ));
    }

    #[test]
    fn test_cursor_reads_ahead_and_seeks() {
        let data: Vec<u8> = (0..200u8).collect();
        let mut cursor = SourceCursor::new(TiffSource::Memory(Bytes::from(data)));

        let mut buf = [0u8; 4];
        cursor.seek(SeekFrom::Start(10)).unwrap();
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [10, 11, 12, 13]);
        assert_eq!(cursor.buffer.len(), 190);

        cursor.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(cursor.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[198, 199]);
        assert_eq!(cursor.read(&mut buf).unwrap(), 0);

        assert!(cursor.seek(SeekFrom::Current(-500)).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_from_local_file_reads_ranges() {
        let path =
            std::env::temp_dir().join(format!("stac-tiler-geotiff-{}.tif", std::process::id()));
        std::fs::write(&path, pyramid()).unwrap();

        let access = GeoTiffAccess::new(ObjectFetcher::without_s3());
        let dataset = access.open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(dataset.metadata().width, 8);
        assert_eq!(dataset.metadata().nodata, None);
        assert_eq!(dataset.overviews().len(), 2);

        let region = tokio::task::spawn_blocking(move || {
            dataset.read_overview_region(0, &PixelWindow::new(0, 0, 4, 4), &[0])
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(region.data, vec![2.0; 16]);

        std::fs::remove_file(&path).ok();
    }
}
