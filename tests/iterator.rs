use cask_log::{Config, Engine, IteratorOptions};
use test_log::test;

fn collect(iter: &mut cask_log::Iter<'_>) -> cask_log::Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut items = Vec::new();
    while iter.valid() {
        items.push((iter.key().to_vec(), iter.value()?));
        iter.next();
    }
    Ok(items)
}

#[test]
fn forward_and_reverse_scans() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;
    engine.put(b"c", b"3")?;
    engine.put(b"a", b"1")?;
    engine.put(b"b", b"2")?;

    let mut iter = engine.iterator();
    let items = collect(&mut iter)?;
    assert_eq!(
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ],
        items
    );

    let mut iter = engine.iterator_with(IteratorOptions {
        reverse: true,
        ..IteratorOptions::default()
    });
    let items = collect(&mut iter)?;
    assert_eq!(
        vec![
            (b"c".to_vec(), b"3".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"a".to_vec(), b"1".to_vec()),
        ],
        items
    );

    Ok(())
}

#[test]
fn prefix_scan() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;
    engine.put(b"user:1", b"A")?;
    engine.put(b"user:2", b"B")?;
    engine.put(b"product:1", b"P")?;
    engine.put(b"zz", b"Z")?;

    let mut iter = engine.iterator_with(IteratorOptions {
        prefix: b"user:".to_vec(),
        reverse: false,
    });
    let items = collect(&mut iter)?;
    assert_eq!(
        vec![
            (b"user:1".to_vec(), b"A".to_vec()),
            (b"user:2".to_vec(), b"B".to_vec()),
        ],
        items
    );

    let mut iter = engine.iterator_with(IteratorOptions {
        prefix: b"user:".to_vec(),
        reverse: true,
    });
    let items = collect(&mut iter)?;
    assert_eq!(
        vec![
            (b"user:2".to_vec(), b"B".to_vec()),
            (b"user:1".to_vec(), b"A".to_vec()),
        ],
        items
    );

    // a prefix matching nothing yields an invalid cursor right away
    let mut iter = engine.iterator_with(IteratorOptions {
        prefix: b"missing:".to_vec(),
        reverse: false,
    });
    assert!(collect(&mut iter)?.is_empty());

    Ok(())
}

#[test]
fn seek_and_rewind() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;
    for key in [b"aa", b"cc", b"ee"] {
        engine.put(key, b"v")?;
    }

    let mut iter = engine.iterator();

    iter.seek(b"bb");
    assert!(iter.valid());
    assert_eq!(b"cc", iter.key());

    iter.seek(b"ff");
    assert!(!iter.valid());

    iter.rewind();
    assert!(iter.valid());
    assert_eq!(b"aa", iter.key());

    let mut iter = engine.iterator_with(IteratorOptions {
        reverse: true,
        ..IteratorOptions::default()
    });
    iter.seek(b"dd");
    assert!(iter.valid());
    assert_eq!(b"cc", iter.key());

    Ok(())
}

#[test]
fn prefix_scan_stops_at_region_boundary() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;
    engine.put(b"a:1", b"before")?;
    engine.put(b"b:1", b"in")?;
    engine.put(b"b:2", b"in")?;
    engine.put(b"c:1", b"after")?;

    let mut iter = engine.iterator_with(IteratorOptions {
        prefix: b"b:".to_vec(),
        reverse: false,
    });
    let items = collect(&mut iter)?;
    assert_eq!(
        vec![
            (b"b:1".to_vec(), b"in".to_vec()),
            (b"b:2".to_vec(), b"in".to_vec()),
        ],
        items
    );

    // the same keys come back in reverse
    let mut iter = engine.iterator_with(IteratorOptions {
        prefix: b"b:".to_vec(),
        reverse: true,
    });
    let items = collect(&mut iter)?;
    assert_eq!(
        vec![
            (b"b:2".to_vec(), b"in".to_vec()),
            (b"b:1".to_vec(), b"in".to_vec()),
        ],
        items
    );

    Ok(())
}

#[test]
fn seek_within_prefix() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;
    for i in 0..10u32 {
        engine.put(format!("user:{i}").as_bytes(), b"u")?;
        engine.put(format!("item:{i}").as_bytes(), b"i")?;
    }

    let mut iter = engine.iterator_with(IteratorOptions {
        prefix: b"user:".to_vec(),
        reverse: false,
    });

    iter.seek(b"user:5");
    assert!(iter.valid());
    assert_eq!(b"user:5", iter.key());

    // seeking before the prefix region lands on its first key
    iter.seek(b"a");
    assert!(iter.valid());
    assert_eq!(b"user:0", iter.key());

    // seeking past the region exhausts the cursor
    iter.seek(b"zzz");
    assert!(!iter.valid());

    Ok(())
}

#[test]
fn iterator_over_empty_engine() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;

    let mut iter = engine.iterator();
    assert!(!iter.valid());
    iter.rewind();
    assert!(!iter.valid());

    Ok(())
}

#[test]
fn iterator_is_a_snapshot() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;
    engine.put(b"k", b"old")?;

    let mut iter = engine.iterator();

    // mutations after creation are invisible, including overwrites of
    // keys the iterator will visit
    engine.put(b"k", b"new")?;
    engine.put(b"added", b"x")?;

    let items = collect(&mut iter)?;
    assert_eq!(vec![(b"k".to_vec(), b"old".to_vec())], items);

    assert_eq!(b"new".to_vec(), engine.get(b"k")?);

    Ok(())
}

#[test]
fn list_keys_and_fold() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default())?;
    engine.put(b"b", b"2")?;
    engine.put(b"a", b"1")?;
    engine.put(b"c", b"3")?;

    assert_eq!(
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
        engine.list_keys()?
    );

    let mut seen = Vec::new();
    engine.fold(|key, value| {
        seen.push((key.to_vec(), value));
        true
    })?;
    assert_eq!(3, seen.len());
    assert_eq!((b"a".to_vec(), b"1".to_vec()), seen.remove(0));

    // fold stops when the closure returns false
    let mut count = 0;
    engine.fold(|_, _| {
        count += 1;
        false
    })?;
    assert_eq!(1, count);

    Ok(())
}

#[test]
fn reverse_default_direction_from_config() -> cask_log::Result<()> {
    let folder = tempfile::tempdir()?;

    let engine = Engine::open(folder.path(), Config::default().reverse(true))?;
    engine.put(b"a", b"1")?;
    engine.put(b"b", b"2")?;

    assert_eq!(vec![b"b".to_vec(), b"a".to_vec()], engine.list_keys()?);

    Ok(())
}
