use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::rc::Rc;

use anyhow::Result;
use ivd_core::keywords::AttributeKey;
use ivd_core::{Environment, ItemId, LoadStatus, ModelCallbacks, ModelItemId};

#[derive(Default)]
struct Row {
    numbers: Rc<RefCell<BTreeMap<String, f64>>>,
}

impl ModelCallbacks for Row {
    fn get_number(&self, key: &str) -> f64 {
        self.numbers.borrow().get(key).copied().unwrap_or(0.0)
    }

    fn get_string(&self, _key: &str) -> String {
        String::new()
    }

    fn set_number(&mut self, key: &str, value: f64) {
        self.numbers.borrow_mut().insert(key.to_string(), value);
    }

    fn set_string(&mut self, _key: &str, _value: &str) {}

    fn on_trigger(&mut self, _key: &str) {}
}

const ROWS: &str = r##"{ "elements": [
  { "path": ["Window"], "attributes": { "position-within": "Environment", "layout": "vbox" } },
  { "path": ["Window", "Row"], "model": ["Rows"],
    "attributes": { "position-within": "Window", "width": "10" },
    "states": [
      { "when": "model.big", "attributes": { "width": "20", "height": "30" } },
      { "when": "model.left & model.right", "attributes": { "color": "#ff0000" },
        "set": { "model.count": "7" } }
    ] }
] }"##;

fn row_of(env: &Environment, model: ModelItemId) -> ItemId {
    env.item_for_path(&["Window", "Row"], Some(model)).expect("row instantiated")
}

fn number(env: &Environment, id: ItemId, key: AttributeKey) -> Option<f64> {
    env.world().item(id)?.number(key, env.world())
}

fn setup() -> Result<(Environment, tempfile::TempDir, ivd_core::ContainerId)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rows.ivd.json");
    fs::write(&path, ROWS)?;
    let mut env = Environment::new();
    let rows = env.add_model("Rows");
    assert_eq!(env.load_file(&path), LoadStatus::Success);
    Ok((env, dir, rows))
}

#[test]
fn earlier_layers_win_over_later_ones() -> Result<()> {
    let (mut env, _dir, rows) = setup()?;
    let item = env.models_mut().push_back_new(rows)?;
    env.run_until_idle(20);
    let row = row_of(&env, item);
    assert_eq!(number(&env, row, AttributeKey::SizeA), Some(10.0));

    env.models_mut().set_state(item, "big")?;
    env.run_until_idle(20);
    // The base width stays, the height only the state sets comes through.
    assert_eq!(number(&env, row, AttributeKey::SizeA), Some(10.0));
    assert_eq!(number(&env, row, AttributeKey::SizeO), Some(30.0));

    env.models_mut().unset_state(item, "big")?;
    env.run_until_idle(20);
    assert!(!env.world().item(row).unwrap().is_active(AttributeKey::SizeO));
    Ok(())
}

#[test]
fn composite_state_follows_its_operands() -> Result<()> {
    let (mut env, _dir, rows) = setup()?;
    let item = env.models_mut().push_back_new(rows)?;
    let numbers = Rc::new(RefCell::new(BTreeMap::new()));
    env.models_mut().set_callbacks(item, Box::new(Row { numbers: Rc::clone(&numbers) }))?;
    env.run_until_idle(20);
    let row = row_of(&env, item);
    let colored = |env: &Environment| env.world().item(row).unwrap().element_color().is_some();

    env.models_mut().set_state(item, "left")?;
    env.run_until_idle(20);
    assert!(!colored(&env));
    assert!(numbers.borrow().get("count").is_none());

    env.models_mut().set_state(item, "right")?;
    env.run_until_idle(20);
    assert!(colored(&env));
    assert_eq!(numbers.borrow().get("count"), Some(&7.0));

    env.models_mut().unset_state(item, "left")?;
    env.run_until_idle(20);
    assert!(!colored(&env));
    Ok(())
}

#[test]
fn swap_and_erase_keep_the_container_consistent() -> Result<()> {
    let (mut env, _dir, rows) = setup()?;
    let a = env.models_mut().push_back_new(rows)?;
    let b = env.models_mut().push_back_new(rows)?;
    let c = env.models_mut().push_back_new(rows)?;
    env.run_until_idle(20);
    let window = env.item_for_path(&["Window"], None).unwrap();
    assert_eq!(env.world().item(window).unwrap().children().len(), 3);

    env.models_mut().swap(a, c)?;
    env.run_until_idle(20);
    assert_eq!(env.models().iter(rows).collect::<Vec<_>>(), vec![c, b, a]);

    let erased_row = row_of(&env, b);
    env.models_mut().erase_later(b)?;
    env.run_until_idle(20);
    assert_eq!(env.models().iter(rows).collect::<Vec<_>>(), vec![c, a]);
    assert!(env.world().item(erased_row).is_none());
    assert!(!env.models().contains(b));
    assert_eq!(env.world().item(window).unwrap().children().len(), 2);
    Ok(())
}

#[test]
fn quit_trigger_from_a_file_ends_the_loop() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("quit.ivd.json");
    fs::write(
        &path,
        r#"{ "elements": [
  { "path": ["Window"], "attributes": { "position-within": "Environment" },
    "states": [ { "when": "this.IVD-Window-Initialized", "attributes": { "triggers": ["::IVD-Core-Quit"] } } ] }
] }"#,
    )?;
    let mut env = Environment::new();
    assert_eq!(env.load_file(&path), LoadStatus::Success);
    assert_eq!(env.run_until_idle(50), None);
    Ok(())
}

#[test]
fn a_second_document_is_refused() -> Result<()> {
    let (mut env, _dir, _rows) = setup()?;
    assert_eq!(env.load_str(ROWS), LoadStatus::CompileError);
    assert!(env.item_for_path(&["Window"], None).is_some());
    Ok(())
}
