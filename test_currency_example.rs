#![allow(clippy::uninlined_format_args)]

use codepaste::{CodeExtractor, Heuristics};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Testing extraction against a receipt-style email with a real code buried in it...");

    let extractor = CodeExtractor::new(&Heuristics::default())?;

    // The kind of email that used to produce false positives: order number,
    // currency figure, phone number, and a year all near the actual code.
    let content = "\
Thanks for your purchase!

Order #482913 has shipped. Your total was $1,249.99.
Questions? Call 555-123-4567 between 9am and 5pm.

To track your package online you'll need to sign in.
Your verification code is: 847293

© 2024 Example Shop, Inc.";

    let subject = "Your order and sign-in verification";

    match extractor.extract(content, subject) {
        Some(code) => {
            println!("Extracted: {}", code);
            assert_eq!(code, "847293", "picked the wrong token");
            println!("✅ Order number, price, phone number, and year were all skipped");
        }
        None => {
            println!("❌ No code extracted at all");
            std::process::exit(1);
        }
    }

    // The same email without any verification context must stay silent.
    let no_context = "Order #482913 has shipped. Your total was $1,249.99.";
    match extractor.extract(no_context, "Your order has shipped") {
        Some(code) => {
            println!("❌ False positive without context: {}", code);
            std::process::exit(1);
        }
        None => println!("✅ No context, no code"),
    }

    Ok(())
}
