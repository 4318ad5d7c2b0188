//! Built-in test plans
//!
//! Front-end trees the binary can run by name. Worker processes rebuild the
//! coordinator's plan from the same name, so every plan must build the same
//! shape on every call.

use anyhow::{bail, ensure};

use crate::executor::worker::is_worker_process;
use crate::models::TestTree;

/// Exit code used by the `crashy` plan to simulate a dying worker
pub const CRASH_EXIT_CODE: i32 = 70;

struct Plan {
    name: &'static str,
    description: &'static str,
    build: fn() -> TestTree,
}

const PLANS: &[Plan] = &[
    Plan {
        name: "arithmetic",
        description: "Integer arithmetic checks, including one failing and one erroring case",
        build: arithmetic,
    },
    Plan {
        name: "bulk",
        description: "Twelve independent always-passing cases",
        build: bulk,
    },
    Plan {
        name: "nested",
        description: "Deep suites with sections, known failures and a broken suite",
        build: nested,
    },
    Plan {
        name: "crashy",
        description: "A case that kills its worker process (panics in-process)",
        build: crashy,
    },
];

pub fn names() -> Vec<&'static str> {
    PLANS.iter().map(|p| p.name).collect()
}

pub fn describe(name: &str) -> Option<&'static str> {
    PLANS.iter().find(|p| p.name == name).map(|p| p.description)
}

/// Build the named plan
pub fn build(name: &str) -> Option<TestTree> {
    PLANS.iter().find(|p| p.name == name).map(|p| (p.build)())
}

fn checked_div(a: i64, b: i64) -> anyhow::Result<i64> {
    if b == 0 {
        bail!("division of {a} by zero");
    }
    Ok(a / b)
}

fn arithmetic() -> TestTree {
    TestTree::build("arithmetic", |root| {
        root.suite("addition", |s| {
            s.case("small", |t| {
                t.check_eq("1 + 1 == 2", 1 + 1, 2);
                t.check_eq("2 + 3 == 5", 2 + 3, 5);
                t.check_eq("4 + 4 == 8", 4 + 4, 8);
                Ok(())
            });
            s.case("overflow", |t| {
                t.check_eq("i32::MAX.checked_add(1)", i32::MAX.checked_add(1), None);
                t.check_eq("u8::MAX.wrapping_add(1)", u8::MAX.wrapping_add(1), 0);
                Ok(())
            });
            Ok(())
        });
        root.suite("multiplication", |s| {
            s.case("squares", |t| {
                t.check_eq("3 * 3 == 9", 3 * 3, 9);
                t.check_eq("2 * 2 == 5", 2 * 2, 5);
                Ok(())
            });
            s.case("identity", |t| {
                for n in [0, 1, 7, -4] {
                    t.check_eq("n * -1 == -n", n * -1, -n);
                }
                Ok(())
            });
            Ok(())
        });
        root.suite("division", |s| {
            s.case("by_zero", |t| {
                t.check_eq("10 / 2 == 5", checked_div(10, 2)?, 5);
                let quotient = checked_div(1, 0)?;
                t.check_eq("1 / 0 == 0", quotient, 0);
                Ok(())
            });
            s.case("remainder", |t| {
                t.check_eq("7 % 3 == 1", 7 % 3, 1);
                t.check_eq("-7 % 3 == -1", -7 % 3, -1);
                Ok(())
            });
            Ok(())
        });
        Ok(())
    })
}

fn bulk() -> TestTree {
    TestTree::build("bulk", |root| {
        for i in 0..12usize {
            root.case(&format!("case_{i:02}"), move |t| {
                for n in 0..(i % 4 + 1) {
                    t.check_eq("n + i - i == n", n + i - i, n);
                }
                Ok(())
            });
        }
        Ok(())
    })
}

fn nested() -> TestTree {
    TestTree::build("nested", |root| {
        root.suite("parser", |s| {
            s.suite("tokens", |s| {
                s.case("identifiers", |t| {
                    t.section("ascii", |t| {
                        t.check("is_alphabetic('a')", 'a'.is_alphabetic());
                        t.check("!is_alphabetic('1')", !'1'.is_alphabetic());
                        Ok(())
                    })?;
                    t.section("unicode", |t| {
                        t.check("is_alphabetic('é')", 'é'.is_alphabetic());
                        t.broken("is_alphabetic('中') is ident start", "XID tables not wired");
                        Ok(())
                    })
                });
                s.case("numbers", |t| {
                    t.check_eq("\"42\".parse()", "42".parse::<i32>().ok(), Some(42));
                    t.check_eq("\"4x\".parse()", "4x".parse::<i32>().ok(), None);
                    Ok(())
                });
                Ok(())
            });
            s.case("empty_input", |t| {
                let tokens: Vec<&str> = "".split_whitespace().collect();
                t.check("tokens.is_empty()", tokens.is_empty());
                Ok(())
            });
            Ok(())
        });
        root.suite("storage", |s| {
            s.case("pages", |t| {
                let page = vec![0u8; 4096];
                t.check_eq("page.len()", page.len(), 4096);
                t.check("page is zeroed", page.iter().all(|b| *b == 0));
                Ok(())
            });
            s.case("index_out_of_range", |t| {
                let pages: Vec<u32> = vec![1, 2, 3];
                t.check_eq("pages.len()", pages.len(), 3);
                let index = pages.len() + 1;
                t.check_eq("pages[index]", pages[index], 0);
                Ok(())
            });
            Ok(())
        });
        root.suite("network", |s| {
            s.case("loopback", |t| {
                let addr: std::net::IpAddr = "127.0.0.1".parse()?;
                t.check("addr.is_loopback()", addr.is_loopback());
                Ok(())
            });
            let peers: Vec<&str> = Vec::new();
            ensure!(!peers.is_empty(), "no remote peers configured");
            s.case("remote", |t| {
                t.check("reachable", true);
                Ok(())
            });
            Ok(())
        });
        Ok(())
    })
}

fn crashy() -> TestTree {
    TestTree::build("crashy", |root| {
        root.case("before", |t| {
            t.check("ok", true);
            Ok(())
        });
        root.case("crashes", |t| {
            t.check("about to crash", true);
            if is_worker_process() {
                std::process::exit(CRASH_EXIT_CODE);
            }
            panic!("simulated crash");
        });
        root.case("after", |t| {
            t.check_eq("1 + 1 == 2", 1 + 1, 2);
            Ok(())
        });
        Ok(())
    })
}
