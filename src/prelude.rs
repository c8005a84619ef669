//! Preloaded GQL prelude — small helper functions written in GQL itself,
//! run once into every new `Session`'s global bindings (spec.md's
//! component table maps this to `Lib`). Grounded on the teacher's
//! `init.rs` `INITSQL` constant: a bootstrap script of SQL statements run
//! once at `Database::new`, generalized here to a bootstrap script of GQL
//! function bindings.

pub const PRELUDE: &str = r#"
count := func(t) pick(reduce(t, 0, _acc + 1, map:=1), true).value;
sum := func(t, val) pick(reduce(t, 0, _acc + _val, map:=val), true).value;
distinct := func(t, key) map(reduce(t, key, _acc), $value);
group_count := func(t, key) reduce(t, key, _acc + 1, map:=1);
first := func(t) pick(t, true);
"#;
