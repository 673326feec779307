//! Scenario tests for the data context.

#[cfg(test)]
mod tests {
    use crate::context::{StepData, CONFIG_KEY, REQUEST_KEY};
    use serde_json::{json, Map, Value};

    fn weather_run() -> StepData {
        let mut config = Map::new();
        config.insert("unit".into(), json!("C"));
        let mut data = StepData::new(config, "weather-42", "/tmp/temp/weather-42");
        data.init_data(
            json!({"today": {"temp": 17, "rain": false}, "cities": ["Giessen", "Marburg"]}),
            Some("weather"),
        );
        data
    }

    #[test]
    fn test_config_is_addressable_as_data() {
        let data = weather_run();
        let text = data
            .format_str(&json!("{_req|weather|today|temp} {_conf|unit}"), &Value::Null)
            .unwrap();
        assert_eq!(text, "17 C");
        assert!(data.data().get(CONFIG_KEY).is_some());
        assert!(data.data().get(REQUEST_KEY).is_some());
    }

    #[test]
    fn test_values_fill_gaps_left_by_data() {
        let data = weather_run();
        let blueprint = json!({"label": "Today in", "idx": 1});
        let text = data
            .format_str(&json!("{label} {_req|weather|cities|1}"), &blueprint)
            .unwrap();
        assert_eq!(text, "Today in Marburg");
    }

    #[test]
    fn test_option_inside_formatted_blueprint() {
        let data = weather_run();
        let node = json!({
            "type": "option",
            "check": "_req|weather|today|rain",
            "on_true": [{"type": "text", "pattern": "Rain"}],
            "on_false": [{"type": "text", "pattern": "{_req|weather|today|temp} {_conf|unit}"}]
        });

        let chosen = data.execute_option(&node).unwrap();
        assert_eq!(chosen.len(), 1);
        assert_eq!(data.format_str(&chosen[0]["pattern"], &chosen[0]).unwrap(), "17 C");
    }

    #[test]
    fn test_temp_paths_differ_per_run() {
        let a = StepData::new(Map::new(), "a", "/tmp/temp/a");
        let b = StepData::new(Map::new(), "b", "/tmp/temp/b");
        assert_ne!(a.temp_path("title.png"), b.temp_path("title.png"));
        assert!(a.temp_path("title.png").starts_with(a.workspace()));
    }
}
