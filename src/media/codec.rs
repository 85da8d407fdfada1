//! H.264 codec wrappers for the live media path
//!
//! The decoder reassembles RTP payloads into Annex-B access units and hands
//! them to openh264; the encoder goes the other way for the outbound track.
//! Both are behind the `h264` feature since openh264 links a native library.
//! Without it the wrappers construct fine but every codec call fails with an
//! encoding error, which stops the pipeline while signaling and the REST
//! surface keep working.

use crate::{Error, Result};
use bytes::Bytes;
use image::RgbImage;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp::packet::Packet;
use webrtc::rtp::packetizer::Depacketizer;

#[cfg(feature = "h264")]
use openh264::decoder::Decoder;
#[cfg(feature = "h264")]
use openh264::encoder::{Encoder, EncoderConfig};
#[cfg(feature = "h264")]
use openh264::formats::YUVBuffer;

/// Decodes an inbound RTP H.264 stream into RGB frames.
pub struct VideoDecoder {
    depacketizer: H264Packet,
    access_unit: Vec<u8>,
    #[cfg(feature = "h264")]
    decoder: Option<Decoder>,
}

impl VideoDecoder {
    pub fn new() -> Self {
        Self {
            depacketizer: H264Packet::default(),
            access_unit: Vec::new(),
            #[cfg(feature = "h264")]
            decoder: None,
        }
    }

    /// Feed one RTP packet. Payloads accumulate until the marker bit closes
    /// the access unit; a full unit is decoded and, when the decoder emits
    /// a picture, returned as RGB. Returns `Ok(None)` mid-unit and for
    /// units the decoder buffers internally.
    pub fn push_packet(&mut self, packet: &Packet) -> Result<Option<RgbImage>> {
        if packet.payload.is_empty() {
            return Ok(None);
        }

        let nal = self
            .depacketizer
            .depacketize(&packet.payload)
            .map_err(|e| Error::Encoding(format!("H264 depacketize: {e}")))?;
        self.access_unit.extend_from_slice(&nal);

        if !packet.header.marker {
            return Ok(None);
        }

        let unit = std::mem::take(&mut self.access_unit);
        self.decode_access_unit(&unit)
    }

    #[cfg(feature = "h264")]
    fn decode_access_unit(&mut self, unit: &[u8]) -> Result<Option<RgbImage>> {
        if self.decoder.is_none() {
            let decoder =
                Decoder::new().map_err(|e| Error::Encoding(format!("H264 decoder init: {e}")))?;
            self.decoder = Some(decoder);
        }
        let decoder = match &mut self.decoder {
            Some(decoder) => decoder,
            None => return Err(Error::Encoding("decoder not initialized".to_string())),
        };

        let yuv = match decoder.decode(unit) {
            Ok(Some(yuv)) => yuv,
            Ok(None) => return Ok(None),
            Err(e) => return Err(Error::Encoding(format!("H264 decode: {e}"))),
        };

        let (w, h) = yuv.dimensions();
        let mut rgb = vec![0u8; w * h * 3];
        yuv.write_rgb8(&mut rgb);
        let image = RgbImage::from_raw(w as u32, h as u32, rgb)
            .ok_or_else(|| Error::Encoding("decoded frame buffer size mismatch".to_string()))?;
        Ok(Some(image))
    }

    #[cfg(not(feature = "h264"))]
    fn decode_access_unit(&mut self, _unit: &[u8]) -> Result<Option<RgbImage>> {
        Err(Error::Encoding(
            "H264 decoding requires the 'h264' feature".to_string(),
        ))
    }
}

impl Default for VideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes RGB frames into Annex-B H.264 for the outbound track.
pub struct VideoEncoder {
    #[cfg(feature = "h264")]
    encoder: Option<(Encoder, u32, u32)>,
}

impl VideoEncoder {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "h264")]
            encoder: None,
        }
    }

    /// Encode one frame. The underlying encoder is created lazily from the
    /// first frame's dimensions and recreated when they change.
    #[cfg(feature = "h264")]
    pub fn encode(&mut self, image: &RgbImage) -> Result<Bytes> {
        let (w, h) = (image.width(), image.height());

        let needs_init = match &self.encoder {
            Some((_, ew, eh)) => (*ew, *eh) != (w, h),
            None => true,
        };
        if needs_init {
            let config = EncoderConfig::new(w, h);
            let encoder = Encoder::with_config(config)
                .map_err(|e| Error::Encoding(format!("H264 encoder init: {e}")))?;
            self.encoder = Some((encoder, w, h));
        }
        let encoder = match &mut self.encoder {
            Some((encoder, _, _)) => encoder,
            None => return Err(Error::Encoding("encoder not initialized".to_string())),
        };
        let yuv = YUVBuffer::with_rgb(w as usize, h as usize, image.as_raw());
        let bitstream = encoder
            .encode(&yuv)
            .map_err(|e| Error::Encoding(format!("H264 encode: {e}")))?;
        Ok(Bytes::from(bitstream.to_vec()))
    }

    #[cfg(not(feature = "h264"))]
    pub fn encode(&mut self, _image: &RgbImage) -> Result<Bytes> {
        Err(Error::Encoding(
            "H264 encoding requires the 'h264' feature".to_string(),
        ))
    }
}

impl Default for VideoEncoder {
    fn default() -> Self {
        Self::new()
    }
}
