use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};
use runalyze_dump::ActivityExtractor;

fn week_page(rows: usize) -> String {
    let mut html = String::from("<table><tbody>");
    for i in 0..rows {
        let icon = if i % 3 == 0 { "icons8-Running" } else { "icons8-Regular-Biking" };
        html.push_str(&format!(
            r#"<tr id="training_{i}"><td><i class="{icon}"></i></td><td><a href="/health/note/2024-05-{day:02}">day</a></td><td>Steady session</td><td>{km},{dec}&nbsp;km</td><td>12,5 km/h</td></tr>"#,
            day = 27 + (i % 5),
            km = 5 + i % 20,
            dec = i % 10,
        ));
    }
    html.push_str("</tbody></table>");
    html
}

fn bench_extract_week(c: &mut Criterion) {
    let extractor = ActivityExtractor::default();
    let week_start = NaiveDate::from_ymd_opt(2024, 5, 27).expect("date");
    // a busy week, well above what a single athlete records
    let page = week_page(40);
    c.bench_function("extract_week_40_rows", |b| {
        b.iter(|| {
            let records = extractor
                .extract(page.as_bytes(), week_start)
                .expect("extract");
            assert_eq!(records.len(), 40);
        })
    });

    let unknown = page.replace("icons8-Running", "icons8-Mystery");
    c.bench_function("extract_week_keyword_fallback", |b| {
        b.iter(|| extractor.extract(unknown.as_bytes(), week_start).expect("extract"))
    });
}

criterion_group!(benches, bench_extract_week);
criterion_main!(benches);
