//! # 分组优先级编解码基准测试
//!
//! 覆盖规范化、写入令牌与读取解析三条路径，列表长度取 1 到上限

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use token_router::groups::{GroupPriority, TokenGroups, normalize_priorities};
use token_router::testing::token_model;

const MAX: usize = 32;

/// 逆序的优先级列表，规范化时需要完整排序
fn reversed_list(len: usize) -> Vec<GroupPriority> {
    (0..len)
        .rev()
        .map(|i| GroupPriority::new(format!("  group-{i}  "), i64::try_from(i + 1).unwrap_or(i64::MAX)))
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_priorities");
    for len in [1, 8, MAX] {
        let list = reversed_list(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &list, |b, list| {
            b.iter(|| normalize_priorities(black_box(list), MAX));
        });
    }
    group.finish();
}

fn bench_set_group_priorities(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_group_priorities");
    for len in [1, 8, MAX] {
        let list = reversed_list(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &list, |b, list| {
            let mut token = token_model("default");
            b.iter(|| token.set_group_priorities(black_box(list), MAX));
        });
    }
    group.finish();
}

fn bench_group_priorities(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_priorities");
    for len in [1, 8, MAX] {
        let mut token = token_model("default");
        token
            .set_group_priorities(&reversed_list(len), MAX)
            .expect("基准数据应当合法");
        group.bench_with_input(BenchmarkId::from_parameter(len), &token, |b, token| {
            b.iter(|| black_box(token).group_priorities());
        });
    }

    // 未保存列表时退化为主分组
    let legacy = token_model("default");
    group.bench_function("legacy_single_group", |b| {
        b.iter(|| black_box(&legacy).group_priorities());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_normalize,
    bench_set_group_priorities,
    bench_group_priorities
);
criterion_main!(benches);
