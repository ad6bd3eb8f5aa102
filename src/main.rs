use std::io::{self, IsTerminal, Read};

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "overlay-translator-rust",
    version,
    about = "Translate the text in a screenshot and draw the translation over it"
)]
struct Cli {
    /// Captured image to translate (reads image bytes from stdin when omitted)
    #[arg(short = 'i', long = "image")]
    image: Option<String>,

    /// Write the translated overlay as PNG
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Translation provider (google, openai)
    #[arg(short = 'p', long = "provider")]
    provider: Option<String>,

    /// Target language (default from settings: zh-CN)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Source language. Use "auto" to detect.
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Font file used to draw translations
    #[arg(long = "font-path")]
    font_path: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Skip the platform OCR engine and use tesseract only
    #[arg(long = "no-native-ocr")]
    no_native_ocr: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    overlay_translator_rust::logging::init(cli.verbose)?;

    let stdin_bytes = if cli.image.is_none() && !io::stdin().is_terminal() {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Some(buffer)
    } else {
        None
    };

    let config = overlay_translator_rust::Config {
        image_path: cli.image,
        output_path: cli.output,
        provider: cli.provider,
        target_lang: cli.lang,
        source_lang: cli.source_lang,
        font_path: cli.font_path,
        settings_path: cli.read_settings,
        no_native_ocr: cli.no_native_ocr,
    };
    let output = overlay_translator_rust::run(config, stdin_bytes).await?;
    println!("{}", output);
    Ok(())
}
