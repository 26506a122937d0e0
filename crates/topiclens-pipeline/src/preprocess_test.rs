use super::*;

fn post(id: &str, title: &str, body: &str, created_utc: i64) -> PostTextRow {
    PostTextRow {
        reddit_post_id: id.to_string(),
        title: title.to_string(),
        body: Some(body.to_string()),
        created_utc,
    }
}

const LONG_BODY: &str = "We have a tiny galley kitchen and nowhere to put the stand mixer anymore.";

// ---------------------------------------------------------------------------
// clean_text
// ---------------------------------------------------------------------------

#[test]
fn clean_text_strips_markup_and_collapses_whitespace() {
    assert_eq!(
        clean_text("  <p>Best   way</p>\n\tto <b>store</b> herbs  "),
        "Best way to store herbs"
    );
}

#[test]
fn clean_text_of_empty_is_empty() {
    assert_eq!(clean_text(""), "");
    assert_eq!(clean_text(" \n "), "");
}

// ---------------------------------------------------------------------------
// is_valid_content
// ---------------------------------------------------------------------------

#[test]
fn title_length_boundary_is_ten_chars() {
    let body = format!("how to {LONG_BODY}");
    assert!(!is_valid_content("123456789", &body));
    assert!(is_valid_content("1234567890", &body));
}

#[test]
fn body_length_boundary_is_fifty_chars() {
    let title = "How do I organize spices";
    assert!(!is_valid_content(title, &"x".repeat(49)));
    assert!(is_valid_content(title, &"x".repeat(50)));
}

#[test]
fn body_length_counts_characters_not_bytes() {
    let title = "How do I clean copper pans";
    assert!(is_valid_content(title, &"é".repeat(50)));
}

#[test]
fn statement_without_intent_phrase_is_rejected() {
    assert!(!is_valid_content(
        "My new kitchen island",
        "Just finished the renovation and it looks great, very happy with the result."
    ));
}

#[test]
fn intent_phrases_anywhere_are_accepted() {
    let title = "Small apartment kitchen";
    for phrase in ["need help", "looking for", "tips for", "idea for", "ways to"] {
        let body = format!("{LONG_BODY} {phrase} it");
        assert!(is_valid_content(title, &body), "phrase {phrase:?} should match");
    }
}

#[test]
fn leading_question_word_is_case_insensitive() {
    assert!(is_valid_content("WHAT knives do chefs use", LONG_BODY));
}

// ---------------------------------------------------------------------------
// preprocess_posts
// ---------------------------------------------------------------------------

#[test]
fn duplicates_keep_first_occurrence_in_given_order() {
    let posts = vec![
        post("newer", "How do I store basil", LONG_BODY, 200),
        post("older", "How do I  <i>store</i> basil", LONG_BODY, 100),
        post("other", "What pan is best for eggs", LONG_BODY, 50),
    ];

    let (stats, docs) = preprocess_posts(&posts);

    assert_eq!(stats.total, 3);
    assert_eq!(stats.valid, 3);
    assert_eq!(stats.duplicates_removed, 1);
    assert_eq!(stats.cleaned, 2);
    let ids: Vec<&str> = docs.iter().map(|d| d.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["newer", "other"]);
}

#[test]
fn invalid_posts_are_neither_valid_nor_cleaned() {
    let posts = vec![post("short", "Too short", "tiny", 10)];
    let (stats, docs) = preprocess_posts(&posts);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.valid, 0);
    assert!(docs.is_empty());
}

#[test]
fn accepted_document_carries_hash_of_its_text() {
    let posts = vec![post("p1", "How do I store basil", LONG_BODY, 1)];
    let (_, docs) = preprocess_posts(&posts);
    assert_eq!(docs[0].text, format!("How do I store basil {LONG_BODY}"));
    assert_eq!(docs[0].text_hash, text_hash(&docs[0].text));
    assert_eq!(docs[0].text_hash.len(), 64);
}

#[test]
fn empty_id_is_recorded_as_error_and_skipped() {
    let posts = vec![
        post(" ", "How do I store basil", LONG_BODY, 2),
        post("p2", "How do I store thyme", LONG_BODY, 1),
    ];
    let (stats, docs) = preprocess_posts(&posts);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(docs.len(), 1);
}

#[test]
fn missing_body_is_invalid() {
    let mut p = post("p1", "How do I store basil", "", 1);
    p.body = None;
    let (stats, _) = preprocess_posts(&[p]);
    assert_eq!(stats.valid, 0);
}

#[test]
fn text_hash_is_stable_sha256_hex() {
    assert_eq!(
        text_hash("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
