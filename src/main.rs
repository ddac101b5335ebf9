use clap::{Arg, Command};
use codepaste::classifier::FillTarget;
use codepaste::dom::{PageDom, StaticPage};
use codepaste::filler::CodeFiller;
use codepaste::messaging::{Signal, StoreService};
use codepaste::store::{CodeStore, StoredState};
use codepaste::{CodeExtractor, CodeSource, FieldClassifier, Heuristics, ScanSession};
use log::LevelFilter;
use std::fs;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("codepaste")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Detects verification codes in webmail text and auto-fills them into OTP fields")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Heuristics configuration file (YAML)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default heuristics configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("state")
                .long("state")
                .value_name("FILE")
                .help("State document path (JSON); created on first write")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Run code extraction against an email body text file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("TEXT")
                .help("Subject line to use with --test-email")
                .default_value(""),
        )
        .arg(
            Arg::new("source-url")
                .long("source-url")
                .value_name("URL")
                .help("Webmail page URL, used to tag the code source")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("scan-page")
                .long("scan-page")
                .value_name("FILE")
                .help("Classify OTP fields in a page snapshot (JSON)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("fill-code")
                .long("fill-code")
                .value_name("CODE")
                .help("With --scan-page: fill this code and show the result")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("show")
                .long("show")
                .help("Show the current code and its status")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .help("Show the detection history")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("copy")
                .long("copy")
                .help("Print the current code raw (for piping) and mark it consumed")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("clear")
                .long("clear")
                .help("Clear the current code")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("toggle-auto-paste")
                .long("toggle-auto-paste")
                .help("Toggle the auto-paste preference")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .help("Run the full detect-publish-fill pipeline on sample data")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        generate_default_config(path);
        return;
    }

    let heuristics = match matches.get_one::<String>("config") {
        Some(path) => match Heuristics::load_from_file(path) {
            Ok(heuristics) => heuristics,
            Err(e) => {
                eprintln!("Error loading heuristics config: {e}");
                process::exit(1);
            }
        },
        None => Heuristics::default(),
    };

    if let Some(email_file) = matches.get_one::<String>("test-email") {
        let subject = matches.get_one::<String>("subject").unwrap();
        let source = matches
            .get_one::<String>("source-url")
            .map(|u| CodeSource::from_url(u))
            .unwrap_or(CodeSource::Unknown);
        test_email_file(&heuristics, email_file, subject, source);
        return;
    }

    if let Some(page_file) = matches.get_one::<String>("scan-page") {
        scan_page_file(
            &heuristics,
            page_file,
            matches.get_one::<String>("fill-code").map(|s| s.as_str()),
        );
        return;
    }

    if matches.get_flag("demo") {
        run_demo(&heuristics).await;
        return;
    }

    // The remaining operations work against the state document.
    let state_path = matches.get_one::<String>("state").map(Path::new);
    let mut store = CodeStore::from_state(load_state(state_path), &heuristics);

    if matches.get_flag("copy") {
        match store.current_display() {
            Some(display) => {
                if display.expired {
                    eprintln!("Warning: code has expired");
                }
                println!("{}", display.value);
                store.consume();
                save_state(state_path, store.state());
            }
            None => {
                eprintln!("No code to copy");
                process::exit(1);
            }
        }
        return;
    }

    if matches.get_flag("clear") {
        store.clear_current();
        save_state(state_path, store.state());
        println!("✅ Cleared current code");
        return;
    }

    if matches.get_flag("toggle-auto-paste") {
        let enabled = !store.auto_paste_enabled();
        store.set_auto_paste(enabled);
        save_state(state_path, store.state());
        println!(
            "✅ Auto-paste {}",
            if enabled { "enabled" } else { "disabled" }
        );
        return;
    }

    if matches.get_flag("history") {
        print_history(&store);
        return;
    }

    // --show is also the default action.
    print_current(&store);
}

fn load_state(path: Option<&Path>) -> StoredState {
    let Some(path) = path else {
        return StoredState::default();
    };
    if !path.exists() {
        return StoredState::default();
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| {
            serde_json::from_str::<StoredState>(&content).map_err(anyhow::Error::from)
        });
    match parsed {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Warning: could not read state file, starting fresh: {e}");
            StoredState::default()
        }
    }
}

fn save_state(path: Option<&Path>, state: &StoredState) {
    let Some(path) = path else {
        return;
    };
    let json = match serde_json::to_string_pretty(state) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error serializing state: {e}");
            return;
        }
    };
    if let Err(e) = fs::write(path, json) {
        eprintln!("Error writing state file: {e}");
    }
}

fn print_current(store: &CodeStore) {
    match store.current_display() {
        Some(display) if display.expired => {
            println!(
                "Current code: {} (expired) [{}]",
                display.value, display.source
            );
        }
        Some(display) => {
            println!("Current code: {} [{}]", display.value, display.source);
        }
        None => println!("No code detected yet"),
    }
    println!(
        "Auto-paste: {}",
        if store.auto_paste_enabled() { "on" } else { "off" }
    );
}

fn print_history(store: &CodeStore) {
    if store.history().is_empty() {
        println!("History is empty");
        return;
    }
    println!("📋 Detection history (most recent first):");
    for entry in store.history() {
        println!(
            "  {}  [{}]  at {}",
            entry.code, entry.source, entry.timestamp
        );
    }
}

fn test_email_file(heuristics: &Heuristics, path: &str, subject: &str, source: CodeSource) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading email file {path}: {e}");
            process::exit(1);
        }
    };

    let extractor = match CodeExtractor::new(heuristics) {
        Ok(extractor) => extractor,
        Err(e) => {
            eprintln!("Error compiling extraction patterns: {e}");
            process::exit(1);
        }
    };

    println!("🔍 Scanning {path} (subject: {subject:?}, source: {source})");
    match extractor.extract(&content, subject) {
        Some(code) => println!("✅ Detected verification code: {code}"),
        None => println!("No verification code found"),
    }
}

fn scan_page_file(heuristics: &Heuristics, path: &str, fill_code: Option<&str>) {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error reading page snapshot {path}: {e}");
            process::exit(1);
        }
    };
    let mut page = match StaticPage::from_json(&json) {
        Ok(page) => page,
        Err(e) => {
            eprintln!("Error parsing page snapshot: {e}");
            process::exit(1);
        }
    };

    let classifier = FieldClassifier::new(heuristics);
    let code = fill_code.unwrap_or("000000");
    match classifier.select(&page.inputs(), code) {
        Some(FillTarget::Single(id)) => println!("✅ Selected single input {id}"),
        Some(FillTarget::Multiple(ids)) => println!("✅ Selected split-digit group {ids:?}"),
        None => {
            println!("No candidate OTP field found");
            return;
        }
    }

    if let Some(code) = fill_code {
        let filler = CodeFiller::new(heuristics);
        if filler.try_fill(&mut page, code) {
            println!("Filled {code}; field values now:");
            for field in page.inputs() {
                if !field.value.is_empty() {
                    println!("  input {} = {:?}", field.id, field.value);
                }
            }
        } else {
            println!("Fill did not complete");
        }
    }
}

async fn run_demo(heuristics: &Heuristics) {
    println!("🔍 Demo: email detection → store → autofill");

    let extractor = match CodeExtractor::new(heuristics) {
        Ok(extractor) => extractor,
        Err(e) => {
            eprintln!("Error compiling extraction patterns: {e}");
            process::exit(1);
        }
    };

    let email_body = "Welcome back!\n\nYour verification code is: 748291\n\n\
                      It expires in 10 minutes. If you didn't request this, ignore this email.";
    let subject = "Verify your sign-in";

    let mut session = ScanSession::new();
    let Some(code) = session.observe(&extractor, email_body, subject, CodeSource::Gmail) else {
        println!("❌ Demo email produced no code");
        return;
    };
    println!("Detected code {code} in demo email");

    let (client, handle) = StoreService::spawn(CodeStore::new(heuristics));
    let mut signals = client.subscribe();
    client.publish_code(&code, CodeSource::Gmail).await;

    if let Ok(Signal::NewCode(published)) = signals.recv().await {
        println!("Store signalled new code {published}");
    }

    // A sign-in page with a split-digit widget inside a dialog.
    let snapshot = r#"{
        "fields": [
            { "id": 1, "input_type": "email", "name": "email", "dom_order": 0 },
            { "id": 10, "maxlength": 1, "group": 100, "in_dialog": true, "dom_order": 1 },
            { "id": 11, "maxlength": 1, "group": 100, "in_dialog": true, "dom_order": 2 },
            { "id": 12, "maxlength": 1, "group": 100, "in_dialog": true, "dom_order": 3 },
            { "id": 13, "maxlength": 1, "group": 100, "in_dialog": true, "dom_order": 4 },
            { "id": 14, "maxlength": 1, "group": 100, "in_dialog": true, "dom_order": 5 },
            { "id": 15, "maxlength": 1, "group": 100, "in_dialog": true, "dom_order": 6 }
        ]
    }"#;
    let mut page = StaticPage::from_json(snapshot).expect("demo snapshot is valid");

    let fetched = client.get_current_code().await;
    let Some(current) = fetched.code else {
        println!("❌ Store returned no code");
        return;
    };

    let filler = CodeFiller::new(heuristics);
    if filler.try_fill(&mut page, &current.value) {
        print!("Filled split-digit widget: ");
        for field in page.inputs() {
            if field.maxlength == Some(1) {
                print!("[{}]", field.value);
            }
        }
        println!();
        client.mark_consumed().await;
        println!(
            "Code consumed; store now returns {:?}",
            client.get_current_code().await.code
        );

        // The popup's manual fetch: ask the email page to rescan right now.
        client.request_immediate_rescan().await;
        if let Ok(Signal::Rescan) = signals.recv().await {
            println!("Rescan requested; scanning the mailbox again");
            let second_email = "A new sign-in attempt needs confirmation.\n\n\
                                Your verification code is: 519274";
            if let Some(code) =
                session.observe(&extractor, second_email, "Verify your sign-in", CodeSource::Gmail)
            {
                client.publish_code(&code, CodeSource::Gmail).await;
                println!(
                    "Rescan published new code {:?}",
                    client.get_current_code().await.code.map(|c| c.value)
                );
            }
        }
    } else {
        println!("❌ No fillable field found in demo page");
    }

    drop(client);
    let _ = handle.await;
    println!("✅ Demo complete");
}

fn generate_default_config(path: &str) {
    let heuristics = Heuristics::default();
    let yaml = match serde_yaml::to_string(&heuristics) {
        Ok(yaml) => yaml,
        Err(e) => {
            eprintln!("Error serializing default heuristics: {e}");
            process::exit(1);
        }
    };
    let annotated = format!(
        "# codepaste heuristics configuration\n\
         # All values are tunable; these are the shipped defaults.\n{yaml}"
    );
    if let Err(e) = fs::write(path, annotated) {
        eprintln!("Error writing config file {path}: {e}");
        process::exit(1);
    }
    println!("✅ Default configuration written to {path}");
}
