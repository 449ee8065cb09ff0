use imagecache::cache::CacheKey;
use imagecache::commands::{parse_commands, CommandSet};
use imagecache::config::{ImageCacheConfig, ImageFormat};
use std::collections::HashSet;

const PAIRS: [(&str, &str); 4] = [("width", "300"), ("height", "200"), ("rmode", "max"), ("format", "webp")];

#[test]
fn command_order_does_not_change_the_key() {
    let fingerprint = ImageCacheConfig::default().fingerprint();
    let forward: CommandSet = PAIRS.iter().copied().collect();
    let backward: CommandSet = PAIRS.iter().rev().copied().collect();
    assert_eq!(
        CacheKey::build("/img/cat.png", &forward, &fingerprint),
        CacheKey::build("/img/cat.png", &backward, &fingerprint)
    );

    let a = parse_commands(Some("width=300&height=200&rmode=max&format=webp"));
    let b = parse_commands(Some("format=webp&rmode=max&height=200&width=300"));
    assert_eq!(
        CacheKey::build("/img/cat.png", &a, &fingerprint),
        CacheKey::build("/img/cat.png", &b, &fingerprint)
    );
}

#[test]
fn every_single_change_produces_a_new_key() {
    let fingerprint = ImageCacheConfig::default().fingerprint();
    let base: CommandSet = PAIRS.iter().copied().collect();
    let mut keys = HashSet::new();
    keys.insert(CacheKey::build("/img/cat.png", &base, &fingerprint));

    for (name, _) in PAIRS {
        for value in ["1", "2", "crop", "jpeg", ""] {
            let mut changed = base.clone();
            changed.insert(name, value);
            if changed == base {
                continue;
            }
            assert!(
                keys.insert(CacheKey::build("/img/cat.png", &changed, &fingerprint)),
                "collision after setting {}={}",
                name,
                value
            );
        }
    }

    let mut extra = base.clone();
    extra.insert("quality", "80");
    assert!(keys.insert(CacheKey::build("/img/cat.png", &extra, &fingerprint)));
    assert!(keys.insert(CacheKey::build("/img/dog.png", &base, &fingerprint)));
}

#[test]
fn configuration_changes_the_key() {
    let commands = parse_commands(Some("width=10"));
    let default = ImageCacheConfig::default();
    let webp = ImageCacheConfig { default_format: Some(ImageFormat::webp), ..Default::default() };
    let lower_quality = ImageCacheConfig { default_quality: 50, ..Default::default() };
    let salted = ImageCacheConfig { fingerprint_salt: "v2".into(), ..Default::default() };

    let keys: HashSet<_> = [default, webp, lower_quality, salted]
        .iter()
        .map(|cfg| CacheKey::build("/a.png", &commands, &cfg.fingerprint()))
        .collect();
    assert_eq!(keys.len(), 4);
}
