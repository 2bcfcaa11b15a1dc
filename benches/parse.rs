use criterion::{black_box, criterion_group, criterion_main, Criterion};

use saxml::{EventRead, EventReader, NullSink, ParserOptions, SaxParser};

/// Build a document with `n` records, each with a few namespaced
/// attributes, nested elements, text and references.
fn build_document(n: usize) -> Vec<u8> {
	let mut doc = String::from(
		"<?xml version='1.0' encoding='utf-8'?>\n<!DOCTYPE feed [<!ENTITY org 'Example &amp; Co'>]>\n\
		 <feed xmlns='urn:example:feed' xmlns:m='urn:example:meta'>\n",
	);
	for i in 0..n {
		doc.push_str(&format!(
			"<entry id='e{i}' m:rev='{r}'><title>Entry number {i}</title>\
			 <author m:org='&org;'>Author &#x41;{i}</author>\
			 <body><![CDATA[<p>raw & unparsed</p>]]> plain text &lt;{i}&gt;</body>\
			 <m:tags><m:tag/><m:tag/></m:tags></entry>\n",
			i = i,
			r = i % 7,
		));
	}
	doc.push_str("</feed>\n");
	doc.into_bytes()
}

fn short_document(c: &mut Criterion) {
	c.bench_function("short_document", |bench| {
		let doc = b"<?xml version='1.0'?>\n<root xmlns='urn:example:short' a=\"foo\" b='bar'><child>with some text</child></root>";
		let opts = ParserOptions::default().process_namespaces(true);

		bench.iter(|| {
			let mut reader = EventReader::new(black_box(&doc[..]), &opts).unwrap();
			reader.collect_events().unwrap()
		});
	});
}

fn large_document(c: &mut Criterion) {
	let mut group = c.benchmark_group("large_document");
	let doc = build_document(2000);

	group.bench_function("event_reader_raw_names", |b| {
		let opts = ParserOptions::default();
		b.iter(|| {
			let mut reader = EventReader::new(black_box(&doc[..]), &opts).unwrap();
			let mut n = 0usize;
			reader.read_all(|_| n += 1).unwrap();
			n
		});
	});

	group.bench_function("event_reader_namespaces", |b| {
		let opts = ParserOptions::default()
			.process_namespaces(true)
			.report_namespace_prefixes(true);
		b.iter(|| {
			let mut reader = EventReader::new(black_box(&doc[..]), &opts).unwrap();
			let mut n = 0usize;
			reader.read_all(|_| n += 1).unwrap();
			n
		});
	});

	group.bench_function("sax_null_sink", |b| {
		let mut parser = SaxParser::with_options(
			doc.clone(),
			ParserOptions::default().process_namespaces(true),
		);
		b.iter(|| assert!(parser.parse(NullSink)));
	});

	group.finish();
}

criterion_group!(benches, short_document, large_document);
criterion_main!(benches);
