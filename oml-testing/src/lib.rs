//! Internal testing utilities for the oml crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

pub mod proto;

/// Run a table of test cases, collecting failures instead of stopping at the
/// first one.
///
/// Define a `Debug` struct describing one case, build an array or `Vec` of
/// cases and call [`test_each`](TestCases::test_each) with a closure that
/// asserts on a single case:
///
/// ```
/// use oml_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     dims: Vec<i64>,
///     expected: i64,
/// }
///
/// let cases = [
///     Case { dims: vec![], expected: 1 },
///     Case { dims: vec![2, 3], expected: 6 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(case.dims.iter().product::<i64>(), case.expected);
/// });
/// ```
///
/// Every case is run even if an earlier one panics. If any case failed, the
/// call panics with the number of failures and their debug representations.
///
/// Cases and values captured by the closure must be unwind safe. Cases that
/// hold interior mutability can describe how to build the value instead and
/// construct it inside the closure.
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) that passes each case
    /// by value.
    ///
    /// The debug representation of each case is captured before the test
    /// function runs.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<String> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .map(|case| format!("{:?}", case))
            .collect();
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let mut failures = Vec::new();
        for case in self {
            let test = &test;
            let case_str = format!("{:?}", case);
            if std::panic::catch_unwind(move || test(case)).is_err() {
                failures.push(case_str);
            }
        }
        report_failures(&failures);
    }
}

fn report_failures(failures: &[String]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}
