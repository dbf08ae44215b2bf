//! End-to-end behaviour of the model through its public API.

use std::fs;
use std::time::Duration;

use markov_hal::trie::Trie;
use markov_hal::{tokenize, Config, Direction, HalError, Model, ReplySettings, Word, CANNED_REPLY};

fn quick(order: usize) -> Model {
    let mut model = Model::with_seed(order, 7).unwrap();
    model.set_settings(ReplySettings {
        timeout: Duration::from_millis(30),
        ..ReplySettings::default()
    });
    model
}

fn symbol(model: &Model, text: &str) -> u16 {
    model.dictionary().lookup(&Word::spaced(text)).unwrap()
}

fn path_count(model: &Model, direction: Direction, words: &[&str]) -> Option<u16> {
    let symbols: Vec<u16> = words.iter().map(|w| symbol(model, w)).collect();
    let trie = model.trie(direction);
    let nodes = trie.path(&symbols);
    (nodes.len() == symbols.len()).then(|| trie.node(nodes[nodes.len() - 1]).count)
}

/// Pre-order dump of a trie for structural comparison.
fn shape(trie: &Trie) -> Vec<(u16, u16, u32, usize)> {
    trie.preorder()
        .into_iter()
        .map(|id| {
            let node = trie.node(id);
            (node.symbol, node.count, node.usage, node.children.len())
        })
        .collect()
}

#[test]
fn save_then_load_reproduces_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("hal.brn");

    let mut model = quick(3);
    for line in [
        "The quick brown fox jumps over the lazy dog.",
        "Don't panic, it's only a well-known test!",
        "The quick brown fox jumps over the lazy dog.",
        "Über straße café",
    ] {
        model.learn_text(line).unwrap();
    }
    model.save(&path).unwrap();
    let loaded = Model::load(&path).unwrap();

    assert_eq!(loaded.order(), 3);
    let words = |m: &Model| -> Vec<(String, bool)> {
        m.dictionary()
            .words()
            .iter()
            .map(|w| (w.text().to_string(), w.is_attached()))
            .collect()
    };
    assert_eq!(words(&loaded), words(&model));
    for direction in [Direction::Forward, Direction::Backward] {
        assert_eq!(shape(loaded.trie(direction)), shape(model.trie(direction)));
    }
    let phrases = |m: &Model| m.phrases().iter().map(|p| p.forward().to_vec()).collect::<Vec<_>>();
    assert_eq!(phrases(&loaded), phrases(&model));
    assert!(loaded.is_consistent());
}

#[test]
fn teaching_twice_doubles_counts_and_forgetting_removes_both() {
    let mut model = quick(2);
    model.learn_text("birds can fly").unwrap();
    model.learn_text("fish can swim").unwrap();
    model.learn_text("birds can fly").unwrap();
    assert_eq!(model.phrases().len(), 3);
    assert_eq!(path_count(&model, Direction::Forward, &["BIRDS", "CAN", "FLY"]), Some(2));
    assert_eq!(path_count(&model, Direction::Backward, &["FLY", "CAN", "BIRDS"]), Some(2));

    let removed = model.delete_all_matching(2);
    assert_eq!(removed, 2);
    assert_eq!(model.phrases().len(), 1);
    assert_eq!(path_count(&model, Direction::Forward, &["FISH", "CAN", "SWIM"]), Some(1));
    let can = symbol(&model, "CAN");
    let forward = model.trie(Direction::Forward);
    let can_node = forward.find_child(forward.root(), can).unwrap();
    assert_eq!(forward.node(can_node).count, 1);
    assert!(model.is_consistent());
}

#[test]
fn compaction_shifts_every_reference() {
    let mut model = quick(2);
    model.learn_text("alpha beta gamma").unwrap();
    model.learn_text("delta epsilon zeta").unwrap();
    let zeta_before = symbol(&model, "ZETA");

    assert_eq!(model.forget_word("beta"), 1);
    assert!(model.dictionary().lookup(&Word::spaced("ALPHA")).is_none());
    assert!(model.dictionary().lookup(&Word::spaced("BETA")).is_none());
    assert!(model.dictionary().lookup(&Word::spaced("GAMMA")).is_none());

    // three words below ZETA went away
    let zeta_after = symbol(&model, "ZETA");
    assert_eq!(zeta_after, zeta_before - 3);
    assert_eq!(path_count(&model, Direction::Forward, &["DELTA", "EPSILON", "ZETA"]), Some(1));
    let phrase = model.phrases().get(0).unwrap();
    assert!(phrase.words().contains(&zeta_after));
    assert_eq!(model.phrase_text(0).unwrap(), "Delta epsilon zeta.");
    assert!(model.is_consistent());
}

#[test]
fn fox_reply_mentions_fox_or_admits_ignorance() {
    let mut model = quick(2);
    model.learn_text("THE QUICK BROWN FOX.").unwrap();
    for _ in 0..5 {
        let reply = model.generate_reply("what does the fox say");
        assert!(!reply.is_empty());
        assert!(
            reply.to_uppercase().contains("FOX") || reply == CANNED_REPLY,
            "unexpected reply {reply:?}"
        );
    }
}

#[test]
fn replies_are_rendered_with_original_spacing() {
    let mut model = quick(1);
    model.learn_text("Hello, world!").unwrap();
    let reply = model.generate_reply("world");
    assert!(reply == "Hello, world!" || reply == CANNED_REPLY, "got {reply:?}");
}

#[test]
fn find_closest_on_empty_model_is_none() {
    let model = quick(2);
    assert_eq!(model.find_closest("the quick brown fox"), None);
}

#[test]
fn usage_equals_sum_of_child_counts() {
    let mut model = quick(3);
    for line in [
        "one fish two fish red fish blue fish",
        "the cat in the hat",
        "the cat sat on the mat",
        "fish fish fish fish fish",
    ] {
        model.learn_text(line).unwrap();
    }
    for direction in [Direction::Forward, Direction::Backward] {
        let trie = model.trie(direction);
        for id in trie.preorder() {
            let node = trie.node(id);
            let sum: u32 = node.children.iter().map(|&c| u32::from(trie.node(c).count)).sum();
            assert_eq!(node.usage, sum);
        }
    }
}

#[test]
fn trimming_respects_the_node_budget() {
    let mut model = quick(2);
    for i in 0..100 {
        model.learn_text(&format!("fact k{i} is worth remembering")).unwrap();
    }
    let budget = model.stats().node_count() / 3;
    model.trim(budget);
    assert!(model.stats().node_count() <= budget);
    assert!(model.is_consistent());
}

#[test]
fn order_change_survives_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hal.brn");
    let mut model = quick(2);
    model.learn_text("a long enough sentence for order five").unwrap();
    model.set_order(5).unwrap();
    model.save(&path).unwrap();
    let loaded = Model::load(&path).unwrap();
    assert_eq!(loaded.order(), 5);
    assert_eq!(
        path_count(&loaded, Direction::Forward, &["A", "LONG", "ENOUGH", "SENTENCE", "FOR", "ORDER"]),
        Some(1)
    );
}

#[test]
fn garbage_and_truncated_brains_fall_back_to_the_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        resources_dir: dir.path().join("data"),
        cache_dir: dir.path().join("cache"),
        timeout_ms: 20,
        ..Config::default()
    };
    fs::create_dir_all(&config.resources_dir).unwrap();
    fs::create_dir_all(&config.cache_dir).unwrap();
    fs::write(config.corpus_path(), "# corpus\nthe cat sat on the mat\nthe dog ate the bone\n").unwrap();

    // garbage
    fs::write(config.brain_path(), b"definitely not a brain").unwrap();
    assert!(matches!(Model::load(&config.brain_path()), Err(HalError::Format(_))));
    let model = Model::load_personality(&config).unwrap();
    assert_eq!(model.phrases().len(), 2);

    // truncated
    model.save(&config.brain_path()).unwrap();
    let bytes = fs::read(config.brain_path()).unwrap();
    fs::write(config.brain_path(), &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(Model::load(&config.brain_path()), Err(HalError::Truncated(_))));
    let model = Model::load_personality(&config).unwrap();
    assert_eq!(model.phrases().len(), 2);
    assert_eq!(model.settings().timeout, Duration::from_millis(20));
}

#[test]
fn personality_without_any_files_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        resources_dir: dir.path().join("missing"),
        cache_dir: dir.path().join("cache"),
        timeout_ms: 10,
        ..Config::default()
    };
    let mut model = Model::load_personality(&config).unwrap();
    assert_eq!(model.phrases().len(), 0);
    assert_eq!(model.generate_reply("hello"), CANNED_REPLY);

    model.learn_text("remember this for later").unwrap();
    model.save_personality(&config).unwrap();
    let reloaded = Model::load_personality(&config).unwrap();
    assert_eq!(reloaded.phrases().len(), 1);
    let dump = fs::read_to_string(config.phrases_path()).unwrap();
    assert_eq!(dump.trim(), "REMEMBER THIS FOR LATER.");
    // the dump can be learned again
    assert_eq!(tokenize(dump.trim()).len(), 5);
}

#[test]
fn word_tables_shape_the_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        resources_dir: dir.path().to_path_buf(),
        cache_dir: dir.path().join("cache"),
        timeout_ms: 10,
        ..Config::default()
    };
    fs::write(config.ban_path(), "THE\nA\n").unwrap();
    fs::write(config.aux_path(), "MY\n").unwrap();
    fs::write(config.swap_path(), "I YOU\n").unwrap();
    let model = Model::load_personality(&config).unwrap();
    assert_eq!(model.tables().ban.len(), 2);
    assert_eq!(model.tables().aux.len(), 1);
    assert_eq!(model.tables().swap.len(), 1);
}

#[test]
fn gzip_corpus_trains_like_plain_text() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let text = "red sky at night\nshepherd's delight\n";
    let plain = dir.path().join("c.trn");
    let packed = dir.path().join("c.trn.gz");
    fs::write(&plain, text).unwrap();
    let mut encoder = GzEncoder::new(fs::File::create(&packed).unwrap(), Compression::best());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let mut a = quick(2);
    let mut b = quick(2);
    assert_eq!(a.train_file(&plain).unwrap(), 2);
    assert_eq!(b.train_file(&packed).unwrap(), 2);
    assert_eq!(shape(a.trie(Direction::Forward)), shape(b.trie(Direction::Forward)));
}

#[test]
fn configured_order_relearns_a_saved_brain() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config {
        resources_dir: dir.path().join("data"),
        cache_dir: dir.path().join("cache"),
        timeout_ms: 10,
        ..Config::default()
    };
    let mut model = quick(2);
    model.learn_text("every good boy deserves fudge").unwrap();
    model.save_personality(&config).unwrap();

    // no configured order keeps the brain's
    assert_eq!(Model::load_personality(&config).unwrap().order(), 2);

    config.order = Some(4);
    let relearned = Model::load_personality(&config).unwrap();
    assert_eq!(relearned.order(), 4);
    assert_eq!(relearned.phrases().len(), 1);
    assert_eq!(
        path_count(&relearned, Direction::Forward, &["EVERY", "GOOD", "BOY", "DESERVES", "FUDGE"]),
        Some(1)
    );
}
