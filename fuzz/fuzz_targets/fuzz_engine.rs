#![no_main]
use arbitrary::Arbitrary;
use entropy_rs::{BatchRequest, FrequencyContext};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    chunks: Vec<Vec<u8>>,
    selectors: Vec<u32>,
}

fuzz_target!(|input: Input| {
    let mut ctx = FrequencyContext::new();
    let mut total = 0u64;
    for chunk in &input.chunks {
        ctx.update(chunk);
        total += chunk.len() as u64;
    }
    assert_eq!(ctx.symbol_count(), total);
    assert_eq!(ctx.table().iter().sum::<u64>(), total);

    let request = match BatchRequest::from_codes(&input.selectors) {
        Ok(request) => request,
        Err(_) => return,
    };
    let records = ctx.batch_calculate(&request);
    assert_eq!(records.len(), input.selectors.len());

    for record in records {
        if let Ok(value) = record.result {
            if let Some(scalar) = value.as_scalar() {
                assert!(scalar.is_finite());
            }
        }
    }
});
