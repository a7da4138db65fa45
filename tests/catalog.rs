mod common;

use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8Path;

use haggle::catalog::{AutoConfirm, CatalogOptions, KaggleDatasets, ensure_dir};
use haggle::domain::DatasetRef;
use haggle::error::HaggleError;
use haggle::store::{KeyedReader, KeyedStore};

use common::{MockKaggle, page_of, record, temp_root, unreferenced};

fn reference(value: &str) -> DatasetRef {
    value.parse().unwrap()
}

#[test]
fn get_downloads_once_then_reads_locally() {
    let (_temp, root) = temp_root();
    let client = MockKaggle::default().with_archive(
        "user/data",
        &[("readme.txt", b"hello"), ("PresentData.xlsx", b"xlsx")],
    );
    let datasets = KaggleDatasets::new(Some(root.clone()), client).unwrap();
    let data = reference("user/data");

    assert!(!datasets.contains(&data).unwrap());
    let first = datasets.get(&data).unwrap();
    assert_eq!(first.names(), ["readme.txt", "PresentData.xlsx"]);
    assert_eq!(first.get("readme.txt").unwrap(), b"hello");

    let second = datasets.get(&data).unwrap();
    assert_eq!(second.bytes(), first.bytes());
    assert_eq!(datasets.client().download_calls(), 1);
    assert!(datasets.contains(&data).unwrap());
    assert!(root.join("zips/user/data.zip").as_std_path().is_file());
}

#[test]
fn delete_then_contains_is_false() {
    let (_temp, root) = temp_root();
    let client = MockKaggle::default().with_archive("user/data", &[("a.csv", b"1")]);
    let datasets = KaggleDatasets::new(Some(root), client).unwrap();
    let data = reference("user/data");

    datasets.get(&data).unwrap();
    datasets.delete(&data).unwrap();
    assert!(!datasets.contains(&data).unwrap());
    assert_matches!(datasets.delete(&data), Err(HaggleError::NotFound(_)));

    datasets.get(&data).unwrap();
    assert_eq!(datasets.client().download_calls(), 2);
}

#[test]
fn missing_dataset_leaves_store_untouched() {
    let (_temp, root) = temp_root();
    let datasets = KaggleDatasets::new(Some(root), MockKaggle::default()).unwrap();
    let missing = reference("owner/missing-dataset");

    assert_matches!(
        datasets.get(&missing),
        Err(HaggleError::DatasetNotFound(_))
    );
    assert!(!datasets.contains(&missing).unwrap());
    let cached: Vec<DatasetRef> = datasets.archives().keys().unwrap();
    assert!(cached.is_empty());
}

#[test]
fn scratch_directories_are_removed() {
    let (_temp, root) = temp_root();
    let client = MockKaggle::default()
        .with_archive("user/data", &[("a.csv", b"1")])
        .with_broken("user/broken");
    let datasets = KaggleDatasets::new(Some(root.clone()), client).unwrap();

    datasets.get(&reference("user/data")).unwrap();
    assert_matches!(
        datasets.get(&reference("user/broken")),
        Err(HaggleError::Download { .. })
    );
    assert_matches!(
        datasets.get(&reference("user/absent")),
        Err(HaggleError::DatasetNotFound(_))
    );

    let dirs = datasets.client().download_dirs();
    assert_eq!(dirs.len(), 3);
    for dir in dirs {
        assert!(dir.starts_with(root.as_std_path()));
        assert!(!dir.exists(), "{} was left behind", dir.display());
    }
}

#[test]
fn non_zip_download_is_not_cached() {
    let (_temp, root) = temp_root();
    let mut client = MockKaggle::default();
    client
        .archives
        .insert("user/html".to_string(), b"<html>rate limited</html>".to_vec());
    let datasets = KaggleDatasets::new(Some(root.clone()), client).unwrap();
    let html = reference("user/html");

    assert_matches!(datasets.get(&html), Err(HaggleError::Download { .. }));
    assert!(!datasets.contains(&html).unwrap());
    let cached: Vec<DatasetRef> = datasets.archives().keys().unwrap();
    assert!(cached.is_empty());
    assert!(!root.join("zips/user/html.zip").as_std_path().exists());

    assert_matches!(datasets.get(&html), Err(HaggleError::Download { .. }));
    assert_eq!(datasets.client().download_calls(), 2);
}

#[test]
fn search_caches_metadata_last_write_wins() {
    let (_temp, root) = temp_root();
    let mut second = page_of("b", 2);
    second.push(record("owner/a-0", "a 0 updated"));
    second.push(unreferenced("no ref"));
    let client = MockKaggle::default()
        .with_page(1, page_of("a", 2))
        .with_page(2, second);
    let datasets = KaggleDatasets::new(Some(root.clone()), client).unwrap();

    let mut lister = datasets.search("covid").unwrap();
    assert_eq!(lister.size().unwrap(), 4);
    let cached: Vec<DatasetRef> = datasets.meta().keys().unwrap();
    assert_eq!(cached.len(), 4);
    assert!(root.join("meta/owner/b-1.json").as_std_path().is_file());

    let updated = datasets.info(&reference("owner/a-0")).unwrap();
    assert_eq!(updated.title(), Some("a 0 updated"));
    assert_eq!(datasets.client().metadata_calls(), 0);
}

#[test]
fn search_without_metadata_caching_writes_nothing() {
    let (_temp, root) = temp_root();
    let client = MockKaggle::default().with_page(1, page_of("a", 3));
    let options = CatalogOptions {
        cache_metas_on_search: false,
        ..CatalogOptions::default()
    };
    let datasets = KaggleDatasets::open(Some(root), client, options, &AutoConfirm).unwrap();

    let mut lister = datasets.search("anything").unwrap();
    assert!(datasets.client().list_calls().is_empty());
    assert_eq!(lister.size().unwrap(), 3);
    let cached: Vec<DatasetRef> = datasets.meta().keys().unwrap();
    assert!(cached.is_empty());
}

#[test]
fn info_fetches_once_and_fills_in_ref() {
    let (_temp, root) = temp_root();
    let sales = reference("shop/sales");
    let mut client = MockKaggle::default();
    client
        .metadata
        .insert(sales.to_string(), unreferenced("Sales"));
    let datasets = KaggleDatasets::new(Some(root), client).unwrap();
    let mut expected = unreferenced("Sales");
    expected.set_reference(&sales);

    let first = datasets.info(&sales).unwrap();
    let second = datasets.info(&sales).unwrap();
    assert_eq!(first, expected);
    assert_eq!(second, expected);
    assert_eq!(datasets.client().metadata_calls(), 1);
    assert!(datasets.meta().contains(&sales).unwrap());
}

#[test]
fn declined_root_is_an_error() {
    let (_temp, root) = temp_root();
    let asked = Mutex::new(Vec::new());
    let decline = |path: &Utf8Path| {
        asked.lock().unwrap().push(path.to_owned());
        false
    };
    let result = KaggleDatasets::open(
        Some(root.clone()),
        MockKaggle::default(),
        CatalogOptions::default(),
        &decline,
    );

    assert_matches!(result, Err(HaggleError::Directory { .. }));
    assert_eq!(*asked.lock().unwrap(), vec![root.clone()]);
    assert!(!root.as_std_path().exists());
}

#[test]
fn existing_root_is_not_confirmed() {
    let (_temp, root) = temp_root();
    std::fs::create_dir_all(root.as_std_path()).unwrap();
    let refuse = |_: &Utf8Path| -> bool { panic!("should not ask") };
    let datasets = KaggleDatasets::open(
        Some(root.clone()),
        MockKaggle::default(),
        CatalogOptions::default(),
        &refuse,
    )
    .unwrap();
    assert!(datasets.zips_dir().as_std_path().is_dir());
    assert!(datasets.meta_dir().as_std_path().is_dir());
    let shown = format!("{datasets:?}");
    assert!(shown.starts_with("KaggleDatasets"), "{shown}");
    assert!(shown.contains(root.as_str()), "{shown}");
}

#[test]
fn file_in_place_of_root_is_rejected() {
    let (_temp, root) = temp_root();
    std::fs::write(root.as_std_path(), b"not a dir").unwrap();
    assert_matches!(
        ensure_dir(&root, None),
        Err(HaggleError::Directory { .. })
    );
}

#[test]
fn cached_lists_local_archives() {
    let (_temp, root) = temp_root();
    let client = MockKaggle::default()
        .with_archive("user/one", &[("a.csv", b"1")])
        .with_archive("other/two", &[("b.csv", b"22")]);
    let datasets = KaggleDatasets::new(Some(root), client).unwrap();

    datasets.get(&reference("user/one")).unwrap();
    datasets.get(&reference("other/two")).unwrap();

    let cached = datasets.cached().unwrap();
    let refs: Vec<String> = cached.iter().map(|entry| entry.reference.to_string()).collect();
    assert_eq!(refs, vec!["other/two", "user/one"]);
    assert!(cached.iter().all(|entry| entry.size > 0));
    assert!(cached.iter().all(|entry| entry.modified.is_some()));
}
