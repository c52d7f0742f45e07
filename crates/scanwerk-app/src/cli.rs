// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments of the `scanwerk` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "scanwerk",
    about = "Scan pages into searchable documents and export them as PDF or text",
    version
)]
pub struct Args {
    /// Directory holding the cache and config.json
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a photographed page to a document and recognize its text
    Scan {
        /// Photo of the page
        image: PathBuf,

        /// Page corners as x,y,x,y,x,y,x,y (any order); detected when omitted
        #[arg(long)]
        corners: Option<String>,

        /// Extra clockwise rotation in degrees (multiple of 90)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        rotate: i32,

        /// Use a recorded recognition result instead of the OCR engine
        #[arg(long)]
        ocr_json: Option<PathBuf>,

        /// Title of the new document
        #[arg(long, conflicts_with = "document")]
        title: Option<String>,

        /// Append to an existing document
        #[arg(long)]
        document: Option<String>,
    },
    /// List documents
    List {
        /// Only documents whose title contains this (case-insensitive)
        #[arg(long, short = 'q')]
        query: Option<String>,
    },
    /// Show a document's pages and text
    Show { id: String },
    /// Rename a document
    Rename { id: String, title: String },
    /// Reorder pages, e.g. `p3,p1,p2`
    Reorder { id: String, order: String },
    /// Export a document
    Export {
        id: String,

        #[arg(long, short = 'o')]
        out: PathBuf,

        #[arg(long, value_enum, default_value_t = FormatArg::Pdf)]
        format: FormatArg,

        /// Leave the scanned image out and lay the text out instead
        #[arg(long)]
        no_image: bool,

        /// Paint the text over the image instead of hiding it
        #[arg(long)]
        visible_text: bool,

        /// Fixed paper size (a4, a3, a5, letter, legal); pages follow the
        /// scan size when omitted
        #[arg(long)]
        paper: Option<String>,
    },
    /// Print the text layer of a PDF
    Verify { file: PathBuf },
    /// Delete a document
    Delete { id: String },
    /// Summarize a document's text with the language assistant
    Summarize { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Pdf,
    Text,
}
