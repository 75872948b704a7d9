use reflection_backend::{GeminiClient, Pipeline, PipelineConfig, Store};
use std::io::Read;
use std::sync::Arc;

/// One-shot runner: analyze a single entry in guest mode and print the
/// response as JSON. Entry text comes from argv, or stdin when no args
/// are given.
#[tokio::main]
async fn main() {
    if let Err(e) = reflection_backend::logging::init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let _ = reflection_backend::logging::cleanup_old_logs();

    let api_key = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!("GEMINI_API_KEY is not set");
            std::process::exit(1);
        }
    };

    let entry_text = read_entry();

    let store = match Store::open_in_memory() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let generator = Arc::new(GeminiClient::new(&api_key));
    let pipeline = Pipeline::new(generator, store, PipelineConfig::default());

    match pipeline.analyze(&entry_text, None).await {
        Ok(response) => {
            let json = serde_json::to_string_pretty(&response)
                .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    }
}

fn read_entry() -> String {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return args.join(" ");
    }
    let mut buf = String::new();
    if std::io::stdin().read_to_string(&mut buf).is_err() {
        eprintln!("Failed to read entry text from stdin");
        std::process::exit(1);
    }
    buf
}
