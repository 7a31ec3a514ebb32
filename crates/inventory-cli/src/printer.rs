//! Console rendering of inventory notifications.

use std::io::{self, Write};

use domain::{InventoryItem, Notification, Outcome};

const HEADERS: [&str; 3] = ["Id", "Item Name", "Quantity"];

/// Renders items as a bordered `Id | Item Name | Quantity` table.
pub fn render_inventory(items: &[InventoryItem]) -> String {
    let rows: Vec<[String; 3]> = items
        .iter()
        .map(|item| {
            [
                item.id.to_string(),
                item.item.clone(),
                item.quantity.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = {
        let segments: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        format!("+{}+", segments.join("+"))
    };
    let line = |cells: [&str; 3]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!(" {cell:<width$} "))
            .collect();
        format!("|{}|", padded.join("|"))
    };

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    out.push_str(&line(HEADERS));
    out.push('\n');
    out.push_str(&border);
    out.push('\n');
    for row in &rows {
        out.push_str(&line([row[0].as_str(), row[1].as_str(), row[2].as_str()]));
        out.push('\n');
    }
    if !rows.is_empty() {
        out.push_str(&border);
        out.push('\n');
    }
    out.push_str(&format!("Count: {}\n", rows.len()));
    out
}

/// Writes one block per notification: the table after an applied change, a
/// single line for a rejected command.
pub struct ConsolePrinter<W> {
    out: W,
}

impl<W: Write> ConsolePrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn print(&mut self, notification: &Notification) -> io::Result<()> {
        match &notification.outcome {
            Outcome::Applied { event, snapshot } => {
                writeln!(
                    self.out,
                    "{} (item {}) -> version {}",
                    event.kind(),
                    event.item_id(),
                    notification.version
                )?;
                writeln!(self.out, "{}", render_inventory(&snapshot.items))?;
            }
            Outcome::Rejected { command, error } => {
                let kind = command
                    .as_ref()
                    .map(|c| c.kind().as_str())
                    .unwrap_or("Unreadable");
                writeln!(self.out, "{kind} rejected: {error}\n")?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
