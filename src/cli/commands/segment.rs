use {
    super::config::ConfigSource,
    clap::Args,
    miette::{Context, IntoDiagnostic, miette},
    std::{fs, path::PathBuf},
    storyreel::segment::{segment_lines, segment_words},
};

#[derive(Args)]
pub struct SegmentArgs {
    /// Story text (reads --file when omitted)
    text: Option<String>,

    /// Read the story text from a file
    #[arg(long, short, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Maximum characters per subtitle line (defaults to the configured value)
    #[arg(long)]
    max_line_chars: Option<usize>,

    /// Also list the words of every line
    #[arg(long, short)]
    words: bool,

    #[command(flatten)]
    source: ConfigSource,
}

pub fn execute(args: SegmentArgs) -> miette::Result<()> {
    let text = match (args.text, &args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => return Err(miette!("Give a story text or --file")),
    };

    let max_chars = match args.max_line_chars {
        Some(max) => max,
        None => args.source.load()?.subtitles.max_line_chars,
    };

    let lines = segment_lines(&text, max_chars);
    let words = segment_words(&lines);

    println!("--- {} lines, {} words (max {max_chars} chars per line)", lines.len(), words.len());
    for (index, line) in lines.iter().enumerate() {
        println!("{index:>4}  {}", line.text);
        if args.words {
            for word in words.iter().filter(|w| w.line_index == index) {
                println!("        {:>3}..{:<3} {}", word.start_char, word.end_char, word.text);
            }
        }
    }

    Ok(())
}
