use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("이미지 파일을 열 수 없습니다: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("이미지를 디코딩할 수 없습니다: {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("JPEG 인코딩에 실패했습니다")]
    Encode(#[source] image::ImageError),
}

/// Decodes an image file and re-encodes it as JPEG bytes.
pub trait ImageConverter {
    fn convert_to_jpeg(&self, source: &Path) -> Result<Vec<u8>, ConvertError>;

    /// Whether real HEIC/HIF containers can be decoded. Runs refuse to start
    /// on trees holding such files when this is false.
    fn decodes_heif(&self) -> bool {
        false
    }
}

/// Converter backed by the `image` crate. The container format is sniffed
/// from the file content, not the extension.
#[derive(Debug, Clone, Copy)]
pub struct ImageCrateConverter {
    quality: u8,
}

impl ImageCrateConverter {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl ImageConverter for ImageCrateConverter {
    fn convert_to_jpeg(&self, source: &Path) -> Result<Vec<u8>, ConvertError> {
        let io_err = |source_err: std::io::Error| ConvertError::Io {
            path: source.to_path_buf(),
            source: source_err,
        };
        let image = ImageReader::open(source)
            .map_err(io_err)?
            .with_guessed_format()
            .map_err(io_err)?
            .decode()
            .map_err(|err| ConvertError::Decode {
                path: source.to_path_buf(),
                message: err.to_string(),
            })?;
        encode_jpeg(&image.to_rgb8(), self.quality)
    }
}

pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(rgb)
        .map_err(ConvertError::Encode)?;
    Ok(out)
}

#[cfg(feature = "heif")]
pub use heif::HeifConverter;

#[cfg(feature = "heif")]
mod heif {
    use super::{encode_jpeg, ConvertError, ImageConverter};
    use image::RgbImage;
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};
    use std::path::Path;

    /// HEIC/HIF decoding through libheif.
    #[derive(Debug, Clone, Copy)]
    pub struct HeifConverter {
        quality: u8,
    }

    impl HeifConverter {
        pub fn new(quality: u8) -> Self {
            Self { quality }
        }
    }

    impl ImageConverter for HeifConverter {
        fn convert_to_jpeg(&self, source: &Path) -> Result<Vec<u8>, ConvertError> {
            let decode_err = |message: String| ConvertError::Decode {
                path: source.to_path_buf(),
                message,
            };

            let path = source
                .to_str()
                .ok_or_else(|| decode_err("UTF-8이 아닌 경로입니다".to_string()))?;
            let lib = LibHeif::new();
            let ctx = HeifContext::read_from_file(path).map_err(|e| decode_err(e.to_string()))?;
            let handle = ctx
                .primary_image_handle()
                .map_err(|e| decode_err(e.to_string()))?;
            let image = lib
                .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
                .map_err(|e| decode_err(e.to_string()))?;

            let planes = image.planes();
            let plane = planes
                .interleaved
                .ok_or_else(|| decode_err("RGB 평면이 없습니다".to_string()))?;
            let row_len = plane.width as usize * 3;
            let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
            for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
                pixels.extend_from_slice(&row[..row_len]);
            }

            let rgb = RgbImage::from_raw(plane.width, plane.height, pixels)
                .ok_or_else(|| decode_err("픽셀 버퍼 크기가 맞지 않습니다".to_string()))?;
            encode_jpeg(&rgb, self.quality)
        }

        fn decodes_heif(&self) -> bool {
            true
        }
    }
}

/// HEIF-capable converter when built with the `heif` feature, otherwise the
/// plain `image` decoder.
pub fn default_converter(quality: u8) -> Box<dyn ImageConverter> {
    #[cfg(feature = "heif")]
    {
        Box::new(HeifConverter::new(quality))
    }
    #[cfg(not(feature = "heif"))]
    {
        Box::new(ImageCrateConverter::new(quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn converts_content_regardless_of_extension() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("disguised.heic");
        RgbImage::from_pixel(4, 3, Rgb([200, 10, 10]))
            .save_with_format(&source, ImageFormat::Png)
            .expect("write png");

        let bytes = ImageCrateConverter::new(80)
            .convert_to_jpeg(&source)
            .expect("png content must decode");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).expect("jpeg must decode");
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn garbage_content_is_a_decode_error() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("broken.heic");
        fs::write(&source, b"definitely not an image").expect("write");

        let err = ImageCrateConverter::new(75)
            .convert_to_jpeg(&source)
            .expect_err("must fail");
        assert!(matches!(err, ConvertError::Decode { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let temp = tempdir().expect("tempdir");
        let err = ImageCrateConverter::new(75)
            .convert_to_jpeg(&temp.path().join("missing.hif"))
            .expect_err("must fail");
        assert!(matches!(err, ConvertError::Io { .. }));
    }

    #[test]
    fn only_the_heif_build_claims_heif_decoding() {
        assert!(!ImageCrateConverter::new(75).decodes_heif());
        assert_eq!(
            default_converter(75).decodes_heif(),
            cfg!(feature = "heif")
        );
    }
}
