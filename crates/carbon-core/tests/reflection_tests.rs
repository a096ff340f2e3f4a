use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use carbon_core::meta;
use carbon_core::{const_var, reflect_class, var, MetaError, TypeMetadata, TypeRegistry};

#[derive(Clone, Debug, PartialEq)]
struct Account {
    owner: String,
    balance: i64,
}
reflect_class!(Account);

fn account_metadata() -> TypeMetadata {
    let mut meta = TypeMetadata::new().with_description("bank account");
    meta.add_constructor(|owner: String| Account { owner, balance: 0 })
        .add_constructor(|owner: String, balance: i64| Account { owner, balance })
        .add_method("balance", |a: &Account| a.balance)
        .add_method_mut("deposit", |a: &mut Account, amount: i64| {
            a.balance += amount;
            a.balance
        })
        .add_property("owner", |a: &Account| a.owner.clone(), |a: &mut Account, v: String| a.owner = v)
        .add_readonly_property("overdrawn", |a: &Account| a.balance < 0)
        .add_event("changed", "balance changed");
    meta
}

fn registry() -> TypeRegistry {
    let reg = TypeRegistry::new();
    reg.register::<Account>(account_metadata());
    reg
}

// ============================================================================
// Construction and methods
// ============================================================================

#[test]
fn test_create_and_call() {
    let reg = registry();
    let acct = reg
        .create_instance("Account", &[var(String::from("ann")), var(10i64)])
        .unwrap();
    assert!(!acct.is_return_value());

    let total = reg.call_method(&acct, "deposit", &[var(5i64)]).unwrap();
    assert_eq!(total.try_cast::<i64>(), Some(15));
    assert_eq!(reg.call_method(&acct, "balance", &[]).unwrap().try_cast::<i64>(), Some(15));
}

#[test]
fn test_lookup_failures() {
    let reg = registry();
    let acct = var(Account { owner: "bo".into(), balance: 0 });
    assert!(matches!(
        reg.call_method(&acct, "withdraw", &[]),
        Err(MetaError::MethodNotFound { .. })
    ));
    assert!(matches!(
        reg.create_instance("Ledger", &[]),
        Err(MetaError::TypeNotFound(_))
    ));
    assert!(matches!(
        reg.create_instance("Account", &[var(1u8)]),
        Err(MetaError::ConstructorNotFound { .. })
    ));
    assert!(matches!(
        reg.call_method(&var(1u8), "balance", &[]),
        Err(MetaError::MethodNotFound { .. })
    ));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_property_access() {
    let reg = registry();
    let acct = var(Account { owner: "cy".into(), balance: -3 });
    assert_eq!(
        reg.get_property(&acct, "owner").unwrap().try_cast::<String>().unwrap(),
        "cy"
    );
    reg.set_property(&acct, "owner", &var(String::from("di"))).unwrap();
    assert_eq!(acct.try_cast::<Account>().unwrap().owner, "di");
    assert_eq!(reg.get_property(&acct, "overdrawn").unwrap().try_cast::<bool>(), Some(true));
    assert!(matches!(
        reg.set_property(&acct, "overdrawn", &var(false)),
        Err(MetaError::ReadonlyProperty { .. })
    ));
}

#[test]
fn test_const_object_rejects_writes() {
    let reg = registry();
    let acct = const_var(Account { owner: "ed".into(), balance: 1 });
    assert!(matches!(
        reg.set_property(&acct, "owner", &var(String::from("x"))),
        Err(MetaError::ReadonlyValue(_))
    ));
    assert!(reg.call_method(&acct, "deposit", &[var(1i64)]).is_err());
    assert!(reg.get_property(&acct, "owner").is_ok());
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_fire_event() {
    let reg = registry();
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        reg.update("Account", move |meta| {
            assert!(meta.add_event_listener("changed", 0, move |_, args| {
                hits.fetch_add(args.len(), Ordering::SeqCst);
            }));
        })
        .unwrap();
    }
    let acct = var(Account { owner: "fa".into(), balance: 0 });
    assert_eq!(reg.fire_event(&acct, "changed", &[var(1i64), var(2i64)]).unwrap(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(matches!(
        reg.fire_event(&acct, "closed", &[]),
        Err(MetaError::EventNotFound { .. })
    ));
}

// ============================================================================
// Global registry
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
struct Counter(u32);
reflect_class!(Counter);

#[test]
fn test_global_registry() {
    let mut m = TypeMetadata::new();
    m.add_constructor(|| Counter(0))
        .add_method_mut("bump", |c: &mut Counter| c.0 += 1)
        .add_readonly_property("value", |c: &Counter| c.0);
    meta::register_type("Counter", m);

    let c = meta::create_instance("Counter", &[]).unwrap();
    meta::call_method(&c, "bump", &[]).unwrap();
    meta::call_method(&c, "bump", &[]).unwrap();
    assert_eq!(meta::get_property(&c, "value").unwrap().try_cast::<u32>(), Some(2));
    assert!(TypeRegistry::instance().contains("Counter"));

    TypeRegistry::instance()
        .update("Counter", |m| {
            assert!(TypeRegistry::instance().metadata("Counter").is_some());
            m.add_method("doubled", |c: &Counter| c.0 * 2);
        })
        .unwrap();
    assert_eq!(meta::call_method(&c, "doubled", &[]).unwrap().try_cast::<u32>(), Some(4));
}
