use crate::handle::Module;
use crate::registry::Registry;
use crate::samples::{self, run_factorial, run_sort};
use crate::ModuleBuilder;

#[test]
fn test_factorial() {
    let registry = Registry::new();
    let module = Module::new(&registry, samples::factorial(&registry).unwrap());

    assert_eq!(run_factorial(&module, 0).unwrap(), 1);
    assert_eq!(run_factorial(&module, 1).unwrap(), 1);
    assert_eq!(run_factorial(&module, 5).unwrap(), 120);
    assert_eq!(run_factorial(&module, 10).unwrap(), 3628800);
    assert_eq!(run_factorial(&module, 20).unwrap(), 2432902008176640000);
}

#[test]
fn test_factorial_wraps() {
    let registry = Registry::new();
    let module = Module::new(&registry, samples::factorial(&registry).unwrap());

    let expected = (1..=25i64).fold(1i64, |acc, n| acc.wrapping_mul(n));
    assert_eq!(run_factorial(&module, 25).unwrap(), expected);
}

#[test]
fn test_quicksort() {
    let registry = Registry::new();
    let module = Module::new(&registry, samples::quicksort(&registry).unwrap());

    let input = [
        123, 34, -23, 0, 876, 34, 268, 994, -74, -222, 43, 13, -1, 6, 78, 56,
    ];
    let mut expected = input.to_vec();
    expected.sort();
    assert_eq!(run_sort(&module, &input).unwrap(), expected);
}

#[test]
fn test_quicksort_edge_shapes() {
    let registry = Registry::new();
    let module = Module::new(&registry, samples::quicksort(&registry).unwrap());

    assert_eq!(run_sort(&module, &[7]).unwrap(), vec![7]);
    assert_eq!(run_sort(&module, &[2, 1]).unwrap(), vec![1, 2]);
    assert_eq!(run_sort(&module, &[5, 5, 5]).unwrap(), vec![5, 5, 5]);
    assert_eq!(
        run_sort(&module, &[9, 8, 7, 6, 5, 4, 3, 2, 1]).unwrap(),
        vec![1, 2, 3, 4, 5, 6, 7, 8, 9]
    );
    assert_eq!(
        run_sort(&module, &[i64::MAX, i64::MIN, 0]).unwrap(),
        vec![i64::MIN, 0, i64::MAX]
    );
}

#[test]
fn test_concurrent_calls() {
    let registry = Registry::new();
    let module = Module::new(&registry, samples::quicksort(&registry).unwrap());
    module.unpack().unwrap();

    std::thread::scope(|s| {
        for t in 0..4i64 {
            let handle = module.clone();
            s.spawn(move || {
                let input: Vec<i64> = (0..64).map(|i| (i * 37 + t) % 101 - 50).collect();
                let mut expected = input.clone();
                expected.sort();
                for _ in 0..8 {
                    assert_eq!(run_sort(&handle, &input).unwrap(), expected);
                }
            });
        }
    });
}

#[test]
fn test_reimported_module_runs() {
    let registry = Registry::new();
    let desc = samples::factorial_description(&registry).unwrap();
    let json = serde_json::to_string(&desc).unwrap();
    let parsed = serde_json::from_str(&json).unwrap();

    let mut builder = ModuleBuilder::from_description(&registry, &parsed).unwrap();
    let module = Module::new(&registry, builder.create_module().unwrap());
    assert_ne!(module.id(), desc.id);
    assert_eq!(run_factorial(&module, 6).unwrap(), 720);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn quicksort_agrees_with_std_sort(values in prop::collection::vec(any::<i64>(), 1..48)) {
            let registry = Registry::new();
            let module = Module::new(&registry, samples::quicksort(&registry).unwrap());
            let mut expected = values.clone();
            expected.sort();
            prop_assert_eq!(run_sort(&module, &values).unwrap(), expected);
        }

        #[test]
        fn factorial_is_a_wrapping_product(n in 0i64..40) {
            let registry = Registry::new();
            let module = Module::new(&registry, samples::factorial(&registry).unwrap());
            let expected = (1..=n).fold(1i64, |acc, k| acc.wrapping_mul(k));
            prop_assert_eq!(run_factorial(&module, n).unwrap(), expected);
        }
    }
}
