use std::io::{self, Write};

mod frame;
mod input;
mod kitty;
mod shell;

pub use frame::{compose_frame, PageView};
pub use input::{EventMapper, UiEvent};
pub use kitty::{CellArea, KittyRenderer};
pub use shell::TerminalShell;

/// `name[*] | page x/y | zoom%`, followed by any extra segments.
pub fn format_status(
    name: &str,
    current_page: usize,
    total: usize,
    zoom: f32,
    extra: &[&str],
) -> String {
    let zoom_percent = zoom * 100.0;
    let zoom_display = if zoom_percent.is_finite() {
        format!("{:.0}%", zoom_percent)
    } else {
        "-".to_string()
    };
    let page_display = if total == 0 {
        "page -/0".to_string()
    } else {
        format!("page {}/{}", current_page + 1, total)
    };

    let mut status = format!("{name} | {page_display} | {zoom_display}");
    for segment in extra.iter().filter(|segment| !segment.is_empty()) {
        status.push_str(" | ");
        status.push_str(segment);
    }
    status
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_marks_dirty_documents_and_appends_segments() {
        assert_eq!(
            format_status("report.pdf*", 2, 10, 1.25, &[]),
            "report.pdf* | page 3/10 | 125%"
        );
        assert_eq!(
            format_status("Untitled", 0, 1, 1.0, &["", "12"]),
            "Untitled | page 1/1 | 100% | 12"
        );
        assert_eq!(format_status("empty.pdf", 0, 0, 1.0, &[]), "empty.pdf | page -/0 | 100%");
    }
}
