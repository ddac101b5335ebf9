#![allow(clippy::uninlined_format_args)]

use codepaste::classifier::FillTarget;
use codepaste::dom::{InputField, PageDom, StaticPage};
use codepaste::{CodeFiller, CodeSource, CodeStore, FieldClassifier, Heuristics, StoreService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Testing the split-digit widget path end to end...");

    let heuristics = Heuristics::default();

    // Sign-in page: password field, a 4-wide split-digit widget, and an
    // unrelated single-character input elsewhere on the page.
    let mut fields = vec![InputField {
        id: 1,
        input_type: "password".to_string(),
        name: "password".to_string(),
        dom_order: 0,
        ..InputField::default()
    }];
    for i in 0..4u64 {
        fields.push(InputField {
            id: 10 + i,
            maxlength: Some(1),
            group: Some(100),
            dom_order: 1 + i as usize,
            ..InputField::default()
        });
    }
    fields.push(InputField {
        id: 50,
        maxlength: Some(1),
        group: Some(200),
        dom_order: 9,
        ..InputField::default()
    });
    let mut page = StaticPage::new(fields);

    // Publish a 4-digit code through the store service, the way the email
    // page would.
    let (client, handle) = StoreService::spawn(CodeStore::new(&heuristics));
    client.publish_code("4821", CodeSource::Outlook).await;

    let fetched = client.get_current_code().await;
    let code = fetched.code.expect("code should be fresh").value;

    let classifier = FieldClassifier::new(&heuristics);
    match classifier.select(&page.inputs(), &code) {
        Some(FillTarget::Multiple(ids)) => {
            println!("Selected group: {:?}", ids);
            assert_eq!(ids, vec![10, 11, 12, 13]);
        }
        other => {
            println!("❌ Expected the split group, got {:?}", other);
            std::process::exit(1);
        }
    }

    let filler = CodeFiller::new(&heuristics);
    assert!(filler.try_fill(&mut page, &code));
    client.mark_consumed().await;

    for (id, expected) in [(10u64, "4"), (11, "8"), (12, "2"), (13, "1")] {
        assert_eq!(page.field(id).unwrap().value, expected);
    }
    assert_eq!(page.field(1).unwrap().value, "", "password field touched");
    assert_eq!(page.field(50).unwrap().value, "", "outside input touched");
    println!("✅ Digits distributed in order; password and outsider untouched");

    assert_eq!(client.get_current_code().await.code, None);
    println!("✅ Code consumed after fill");

    drop(client);
    let _ = handle.await;
    Ok(())
}
