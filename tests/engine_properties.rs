use vessel_model::metrics;
use vessel_model::models::{ParameterSet, RawParameter};
use vessel_model::{ModelError, calculate, normalize};

fn raw(key: &str, value: &str, kind: &str) -> RawParameter {
    RawParameter::new(key, value, kind)
}

fn round_numbers() -> Vec<RawParameter> {
    vec![
        raw("purchasePrice", "100000000", "currency"),
        raw("term", "5", "years"),
        raw("discountRate", "0.1", "percentage"),
        raw("annualRevenue", "30000000", "currency"),
        raw("annualOperatingCost", "10000000", "currency"),
    ]
}

fn financed() -> ParameterSet {
    let mut params = round_numbers();
    params.extend([
        raw("term", "12", "years"),
        raw("revenueGrowthRate", "2.5%", "percentage"),
        raw("costGrowthRate", "0.03", "percentage"),
        raw("loanToValue", "0.6", "percentage"),
        raw("loanInterestRate", "0.065", "percentage"),
        raw("loanTerm", "8", "years"),
        raw("taxRate", "0.2", "percentage"),
        raw("usefulLife", "20", "years"),
        raw("residualValue", "$18,000,000", "currency"),
        raw("deadweightTonnage", "82000", "tonnage"),
    ]);
    normalize(&params, &ParameterSet::new()).unwrap()
}

#[test]
fn calculation_is_deterministic() {
    let params = financed();
    let first = calculate(&params).unwrap();
    let second = calculate(&params).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn year_zero_is_the_purchase_outlay() {
    for params in [normalize(&round_numbers(), &ParameterSet::new()).unwrap(), financed()] {
        let price = params.get("purchasePrice").and_then(|p| p.number()).unwrap();
        let result = calculate(&params).unwrap();
        assert_eq!(result.cash_flow_projections[0].year, 0);
        assert_eq!(result.cash_flow_projections[0].cash_flow, -price);
    }
}

#[test]
fn years_are_contiguous_from_zero() {
    let result = calculate(&financed()).unwrap();
    assert_eq!(result.cash_flow_projections.len(), 13);
    for (idx, point) in result.cash_flow_projections.iter().enumerate() {
        assert_eq!(point.year as usize, idx);
    }
    assert_eq!(result.chart_data.len(), result.cash_flow_projections.len());
    assert_eq!(result.chart_data[12].name, "Year 12");
}

#[test]
fn npv_matches_cash_flows() {
    let params = financed();
    let result = calculate(&params).unwrap();
    let rate = params.get("discountRate").and_then(|p| p.number()).unwrap();

    let recomputed: f64 = result
        .cash_flow_projections
        .iter()
        .map(|p| p.cash_flow / (1.0 + rate).powi(p.year as i32))
        .sum();
    assert!((recomputed - result.profitability_metrics.npv).abs() < 1e-6);
}

#[test]
fn irr_zeroes_npv_when_defined() {
    let result = calculate(&financed()).unwrap();
    let flows: Vec<f64> = result.cash_flow_projections.iter().map(|p| p.cash_flow).collect();
    let irr = result.profitability_metrics.irr.expect("financed scenario has an IRR");
    let scale: f64 = flows.iter().map(|cf| cf.abs()).sum();
    assert!(metrics::npv(irr, &flows).abs() < scale * 1e-4);
}

#[test]
fn merge_is_idempotent() {
    let input = round_numbers();
    let once = normalize(&input, &ParameterSet::new()).unwrap();
    let again = normalize(&input, &ParameterSet::new()).unwrap();
    assert_eq!(once, again);
    assert_eq!(normalize(&input, &once).unwrap(), once);
}

#[test]
fn last_write_wins() {
    let first = normalize(&[raw("vesselPrice", "10", "currency")], &ParameterSet::new()).unwrap();
    let second = normalize(&[raw("vesselPrice", "20", "currency")], &first).unwrap();
    assert_eq!(second.get("vesselPrice").and_then(|p| p.number()), Some(20.0));
}

#[test]
fn empty_set_is_missing_purchase_price() {
    match calculate(&ParameterSet::new()) {
        Err(ModelError::MissingParameter { key }) => assert_eq!(key, "purchasePrice"),
        other => panic!("expected missing purchasePrice, got {:?}", other),
    }
}

#[test]
fn round_number_scenario() {
    let result = calculate(&normalize(&round_numbers(), &ParameterSet::new()).unwrap()).unwrap();
    assert_eq!(result.cash_flow_projections.len(), 6);
    assert_eq!(result.cash_flow_projections[0].cash_flow, -100_000_000.0);

    // 20M a year for five years at 10% is worth about 75.8M, short of the 100M outlay
    let annuity_factor = (1.0 - 1.1_f64.powi(-5)) / 0.1;
    let textbook = -100_000_000.0 + 20_000_000.0 * annuity_factor;
    assert!(textbook < 0.0);
    assert_eq!(result.profitability_metrics.npv.signum(), textbook.signum());
    assert!((result.profitability_metrics.npv - textbook).abs() < 1e-6);
}

#[test]
fn all_negative_flows_never_pay_back() {
    let mut params = round_numbers();
    params.push(raw("annualOperatingCost", "35000000", "currency"));
    let result = calculate(&normalize(&params, &ParameterSet::new()).unwrap()).unwrap();
    assert!(result.cash_flow_projections.iter().all(|p| p.cash_flow < 0.0));
    assert_eq!(result.profitability_metrics.payback_period, None);

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["profitabilityMetrics"]["paybackPeriod"].is_null());
}

#[test]
fn malformed_raw_parameter_is_rejected() {
    let err = normalize(&[raw("x", "abc", "currency")], &ParameterSet::new()).unwrap_err();
    assert!(matches!(err, ModelError::Validation { ref key, .. } if key == "x"));
}

#[test]
fn wire_shape_uses_contract_names() {
    let result = calculate(&normalize(&round_numbers(), &ParameterSet::new()).unwrap()).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["cashFlowProjections"][0]["year"], 0);
    assert_eq!(json["cashFlowProjections"][0]["cashFlow"], -100_000_000.0);
    assert!(json["profitabilityMetrics"]["npv"].is_number());
    assert!(json["profitabilityMetrics"]["irr"].is_number());
    assert_eq!(json["chartData"][1]["name"], "Year 1");
}
