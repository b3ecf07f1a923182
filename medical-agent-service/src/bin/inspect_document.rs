use anyhow::Result;
use medical_agent_service::{DocumentPayload, ServiceConfig, SmartLoader};
use std::env;

/// Shows how the loader would hand a file to the model, without calling it.
fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <file_path>", args[0]);
        eprintln!("Example: {} /path/to/lab_report.pdf", args[0]);
        std::process::exit(1);
    }

    let loader = SmartLoader::new(ServiceConfig::from_env().loader);

    println!("Document: {}", args[1]);
    println!(
        "Scanned-PDF threshold: {} chars/page",
        loader.config().scanned_pdf_threshold
    );
    println!();

    match loader.process_file(&args[1])? {
        DocumentPayload::Text(text) => {
            println!("Sent as TEXT ({} characters)", text.chars().count());
            println!("────────────────────────────────────");
            let preview: String = text.chars().take(500).collect();
            println!("{}", preview);
            if text.chars().count() > 500 {
                println!("...");
            }
        }
        DocumentPayload::Binary { bytes, media_type } => {
            println!("Sent as BINARY: {} ({} bytes)", media_type, bytes.len());
        }
    }

    Ok(())
}
