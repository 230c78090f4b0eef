//! Kitty graphics protocol output for composed frames.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{cursor, queue};
use pdfdesk_core::Bitmap;
use png::{BitDepth, ColorType, Encoder};

/// Base64 bytes per graphics command; the protocol caps a chunk at 4096.
const CHUNK_SIZE: usize = 4096;
/// Frames alternate between these ids so the old image is deleted only after the new one is
/// on screen.
const FRAME_IDS: [u32; 2] = [1, 2];

/// Cell rectangle a frame is scaled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellArea {
    pub column: u16,
    pub row: u16,
    pub columns: u32,
    pub rows: u32,
}

impl CellArea {
    pub fn new(column: u16, row: u16, columns: u32, rows: u32) -> Self {
        Self {
            column,
            row,
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

/// Identifies what is on screen, so an unchanged frame is not sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shown {
    image_id: u32,
    area: CellArea,
    digest: u64,
}

pub struct KittyRenderer<W: Write> {
    writer: W,
    shown: Option<Shown>,
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            shown: None,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Runs `draw` inside a synchronized update, so the terminal shows everything it wrote at
    /// once.
    pub fn synchronized<F>(&mut self, draw: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.writer.write_all(b"\x1b[?2026h")?;
        let result = draw(self);
        self.writer.write_all(b"\x1b[?2026l")?;
        self.writer.flush()?;
        result
    }

    /// Shows `frame` scaled into `area`. Returns false when the same frame is already there.
    pub fn present(&mut self, frame: &Bitmap, area: CellArea) -> Result<bool> {
        let digest = frame_digest(frame);
        if self
            .shown
            .is_some_and(|shown| shown.area == area && shown.digest == digest)
        {
            return Ok(false);
        }

        let image_id = match self.shown {
            Some(shown) if shown.image_id == FRAME_IDS[0] => FRAME_IDS[1],
            _ => FRAME_IDS[0],
        };
        let png = encode_png(frame)?;
        queue!(self.writer, cursor::MoveTo(area.column, area.row))?;
        for command in transmit_commands(image_id, area, frame, &png) {
            self.writer.write_all(&command)?;
        }
        if let Some(previous) = self.shown {
            self.writer.write_all(&delete_command(previous.image_id))?;
        }
        self.writer.flush()?;
        self.shown = Some(Shown {
            image_id,
            area,
            digest,
        });
        Ok(true)
    }

    /// Removes the frame on screen and frees the terminal's copy.
    pub fn forget(&mut self) -> Result<()> {
        if let Some(shown) = self.shown.take() {
            self.writer.write_all(&delete_command(shown.image_id))?;
            self.writer.flush()?;
        }
        Ok(())
    }
}

fn frame_digest(frame: &Bitmap) -> u64 {
    let mut hasher = DefaultHasher::new();
    frame.width.hash(&mut hasher);
    frame.height.hash(&mut hasher);
    frame.pixels.hash(&mut hasher);
    hasher.finish()
}

fn encode_png(frame: &Bitmap) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, frame.width, frame.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame.pixels)?;
    writer.finish()?;
    Ok(buffer)
}

/// Transmit-and-place commands for one frame, split into protocol-sized chunks. The cursor is
/// left where it was (`C=1`) and the image sits below text (`z=-1`).
fn transmit_commands(image_id: u32, area: CellArea, frame: &Bitmap, png: &[u8]) -> Vec<Vec<u8>> {
    let encoded = BASE64.encode(png);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let more = u8::from(index < last);
            let mut command = if index == 0 {
                format!(
                    "\x1b_Ga=T,f=100,i={image_id},p=1,c={},r={},s={},v={},C=1,z=-1,q=2,m={more}",
                    area.columns, area.rows, frame.width, frame.height,
                )
                .into_bytes()
            } else {
                format!("\x1b_Gm={more},q=2").into_bytes()
            };
            command.push(b';');
            command.extend_from_slice(chunk);
            command.extend_from_slice(b"\x1b\\");
            command
        })
        .collect()
}

fn delete_command(image_id: u32) -> Vec<u8> {
    format!("\x1b_Ga=d,d=I,i={image_id},q=2\x1b\\").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Bitmap {
        Bitmap {
            width,
            height,
            pixels: vec![value; (width * height * 4) as usize],
        }
    }

    fn output(renderer: &mut KittyRenderer<Vec<u8>>) -> String {
        String::from_utf8_lossy(&std::mem::take(renderer.writer())).into_owned()
    }

    #[test]
    fn first_frame_is_transmitted_and_placed() {
        let mut renderer = KittyRenderer::new(Vec::new());
        assert!(renderer.present(&solid(2, 2, 255), CellArea::new(0, 0, 10, 5)).unwrap());
        let text = output(&mut renderer);
        assert!(text.starts_with("\x1b[1;1H"));
        assert!(text.contains("a=T,f=100,i=1,p=1,c=10,r=5,s=2,v=2"));
        assert!(text.ends_with("\x1b\\"));
        assert!(!text.contains("a=d"));
    }

    #[test]
    fn unchanged_frame_is_not_sent_again() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let frame = solid(2, 2, 40);
        let area = CellArea::new(0, 0, 10, 5);
        renderer.present(&frame, area).unwrap();
        output(&mut renderer);

        assert!(!renderer.present(&frame, area).unwrap());
        assert!(output(&mut renderer).is_empty());
        // A new cell area is a new placement even for the same pixels.
        assert!(renderer.present(&frame, CellArea::new(0, 0, 12, 5)).unwrap());
    }

    #[test]
    fn new_frame_replaces_the_old_image_id() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let area = CellArea::new(0, 0, 10, 5);
        renderer.present(&solid(2, 2, 1), area).unwrap();
        output(&mut renderer);

        renderer.present(&solid(2, 2, 2), area).unwrap();
        let text = output(&mut renderer);
        let placed = text.find("i=2,p=1").unwrap();
        let deleted = text.find("a=d,d=I,i=1").unwrap();
        assert!(placed < deleted);

        renderer.present(&solid(2, 2, 3), area).unwrap();
        assert!(output(&mut renderer).contains("a=d,d=I,i=2"));

        renderer.forget().unwrap();
        assert!(output(&mut renderer).contains("a=d,d=I,i=1"));
        renderer.forget().unwrap();
        assert!(output(&mut renderer).is_empty());
    }

    #[test]
    fn large_frames_are_chunked() {
        // Noisy pixels so the PNG stays well above one chunk.
        let pixels: Vec<u8> = (0..64 * 64 * 4)
            .map(|i: u32| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect();
        let frame = Bitmap {
            width: 64,
            height: 64,
            pixels,
        };
        let png = encode_png(&frame).unwrap();
        let commands = transmit_commands(1, CellArea::new(0, 0, 0, 0), &frame, &png);
        assert!(commands.len() > 1);
        assert!(String::from_utf8_lossy(&commands[0]).contains("c=1,r=1"));
        assert!(String::from_utf8_lossy(&commands[0]).contains("m=1"));
        let last = String::from_utf8_lossy(commands.last().unwrap()).into_owned();
        assert!(last.starts_with("\x1b_Gm=0,q=2;"));
        assert!(commands
            .iter()
            .all(|command| command.len() <= CHUNK_SIZE + 64));
    }

    #[test]
    fn synchronized_update_wraps_the_frame() {
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer
            .synchronized(|renderer| {
                renderer.present(&solid(1, 1, 9), CellArea::new(0, 0, 1, 1))?;
                Ok(())
            })
            .unwrap();
        let text = output(&mut renderer);
        assert!(text.starts_with("\x1b[?2026h"));
        assert!(text.ends_with("\x1b[?2026l"));
    }
}
