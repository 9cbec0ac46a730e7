//! HTML day writer
//!
//! Renders the records of one calendar day into a standalone HTML page with
//! navigation to the nearest non-empty days.

use super::types::{DayLinks, ExportPaths, OutputUnit};
use crate::error::{Error, Result};
use crate::types::{Author, Record};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Writer for a single day's output unit
pub struct DayWriter {
    day: NaiveDate,
    path: PathBuf,
    links: DayLinks,
    out: BufWriter<File>,
    records: usize,
}

impl DayWriter {
    /// Create (or truncate) the unit file and write its header
    pub fn create(paths: &ExportPaths, title: &str, day: NaiveDate, links: DayLinks) -> Result<Self> {
        let path = paths.unit_path(day);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::export(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let file = File::create(&path)
            .map_err(|e| Error::export(format!("Failed to create {}: {e}", path.display())))?;

        let mut writer = Self {
            day,
            path,
            links,
            out: BufWriter::new(file),
            records: 0,
        };
        writer.header(title)?;
        Ok(writer)
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Append one record.
    ///
    /// `reply_day` is the day of the record this one replies to, when it is
    /// stored; the link then resolves into that day's unit.
    pub fn write_record(
        &mut self,
        paths: &ExportPaths,
        record: &Record,
        author: Option<&Author>,
        reply_day: Option<NaiveDate>,
    ) -> Result<()> {
        let author_name = match (author, record.author_id) {
            (Some(author), _) => escape_html(&author.display_name),
            (None, Some(id)) => format!("#{id}"),
            (None, None) => String::new(),
        };

        let mut html = format!(
            "<div class=\"message\" id=\"message-{}\">\n\
             <div class=\"meta\"><span class=\"author\">{}</span> <span class=\"time\">{}</span></div>\n",
            record.id,
            author_name,
            record.date.format("%H:%M:%S"),
        );

        if let Some(reply_to) = record.reply_to {
            match reply_day {
                Some(day) => html.push_str(&format!(
                    "<div class=\"reply\"><a href=\"{}\">In reply to #{reply_to}</a></div>\n",
                    ExportPaths::link(day, Some(reply_to))
                )),
                None => html.push_str(&format!(
                    "<div class=\"reply\">In reply to #{reply_to}</div>\n"
                )),
            }
        }

        if !record.text.is_empty() {
            html.push_str(&format!(
                "<div class=\"text\">{}</div>\n",
                escape_html(&record.text).replace('\n', "<br>\n")
            ));
        }

        if let Some(media) = &record.media {
            let label = format!("{} {}", media.kind.as_str(), media.file_name());
            match paths.media_href(media) {
                Some(href) => html.push_str(&format!(
                    "<div class=\"media\"><a href=\"{}\">{label}</a></div>\n",
                    escape_html(&href)
                )),
                None => html.push_str(&format!("<div class=\"media\">{label}</div>\n")),
            }
        }

        html.push_str("</div>\n");
        self.put(&html)?;
        self.records += 1;
        Ok(())
    }

    /// Write the footer and flush
    pub fn finish(mut self) -> Result<OutputUnit> {
        let nav = self.navigation();
        self.put(&format!("{nav}</body>\n</html>\n"))?;
        self.out
            .flush()
            .map_err(|e| Error::export(format!("Failed to flush {}: {e}", self.path.display())))?;

        Ok(OutputUnit {
            day: self.day,
            path: self.path,
            links: self.links,
            records: self.records,
        })
    }

    fn header(&mut self, title: &str) -> Result<()> {
        let day = self.day.format("%Y-%m-%d");
        let nav = self.navigation();
        self.put(&format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{} - {day}</title>\n</head>\n<body>\n<h1>{day}</h1>\n{nav}",
            escape_html(title)
        ))
    }

    fn navigation(&self) -> String {
        let mut nav = String::from("<nav>");
        if let Some(previous) = self.links.previous {
            nav.push_str(&format!(
                "<a class=\"previous\" href=\"{}\">{}</a>",
                ExportPaths::link(previous, None),
                previous.format("%Y-%m-%d")
            ));
        }
        if let Some(following) = self.links.following {
            nav.push_str(&format!(
                "<a class=\"following\" href=\"{}\">{}</a>",
                ExportPaths::link(following, None),
                following.format("%Y-%m-%d")
            ));
        }
        nav.push_str("</nav>\n");
        nav
    }

    fn put(&mut self, html: &str) -> Result<()> {
        self.out
            .write_all(html.as_bytes())
            .map_err(|e| Error::export(format!("Failed to write {}: {e}", self.path.display())))
    }
}

impl std::fmt::Debug for DayWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DayWriter")
            .field("day", &self.day)
            .field("path", &self.path)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
