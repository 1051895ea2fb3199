//! Message catalog
//!
//! The message numbers forwarded to MQTT, each with a stable capability name.
//! The table is sorted by number; a capability's index is its position in
//! the table, which the state store uses as the slot index inside a device.
//! Numbers not listed here are ignored by the bridge.

use crate::codec::MessageNumber;

/// Known message numbers and their capability names, sorted by number
pub const CATALOG: &[(u16, &str)] = &[
    (0x0202, "ad_error_code1"),
    (0x0207, "ad_install_number_indoor"),
    (0x0402, "ad_address_rmc"),
    (0x0409, "ad_install_level_all"),
    (0x040A, "ad_install_level_operation_power"),
    (0x040B, "ad_install_level_operation_mode"),
    (0x040C, "ad_install_level_fan_mode"),
    (0x040D, "ad_install_level_fan_direction"),
    (0x040E, "ad_install_level_temp_target"),
    (0x0410, "ad_install_level_operation_mode_only"),
    (0x0411, "ad_install_level_cool_mode_upper"),
    (0x0412, "ad_install_level_cool_mode_lower"),
    (0x0413, "ad_install_level_heat_mode_upper"),
    (0x0414, "ad_install_level_heat_mode_lower"),
    (0x0415, "ad_install_level_contact_control"),
    (0x0416, "ad_install_level_key_operation_input"),
    (0x0417, "ad_417"),
    (0x0418, "ad_418"),
    (0x0419, "ad_419"),
    (0x041B, "ad_41b"),
    (0x2004, "nm_2004"),
    (0x2012, "nm_2012"),
    (0x22F7, "nm_22f7"),
    (0x22F9, "nm_22f9"),
    (0x22FA, "nm_22fa"),
    (0x22FB, "nm_22fb"),
    (0x22FC, "nm_22fc"),
    (0x22FD, "nm_22fd"),
    (0x22FE, "nm_22fe"),
    (0x22FF, "nm_22ff"),
    (0x2400, "nm_2400"),
    (0x2401, "nm_2401"),
    (0x24FB, "nm_24fb"),
    (0x24FC, "nm_24fc"),
    (0x4000, "in_operation_power"),
    (0x4001, "in_operation_mode"),
    (0x4002, "in_operation_mode_real"),
    (0x4006, "in_fan_mode"),
    (0x4007, "in_fan_mode_real"),
    (0x400F, "in_400f"),
    (0x4010, "in_4010"),
    (0x4015, "in_4015"),
    (0x4019, "in_4019"),
    (0x401B, "in_401b"),
    (0x4023, "in_4023"),
    (0x4024, "in_4024"),
    (0x4027, "in_4027"),
    (0x4028, "in_state_thermo"),
    (0x4029, "in_4029"),
    (0x402A, "in_402a"),
    (0x402B, "in_402b"),
    (0x402D, "in_402d"),
    (0x402E, "in_state_defrost_mode"),
    (0x4031, "in_4031"),
    (0x4035, "in_4035"),
    (0x4038, "in_state_humidity_percent"),
    (0x4043, "in_4043"),
    (0x4046, "in_silence"),
    (0x4047, "in_4047"),
    (0x4048, "in_4048"),
    (0x404F, "in_404f"),
    (0x4051, "in_4051"),
    (0x4059, "in_4059"),
    (0x405F, "in_405f"),
    (0x4060, "in_alternative_mode"),
    (0x4065, "in_water_heater_power"),
    (0x4066, "in_water_heater_mode"),
    (0x4067, "in_3way_valve"),
    (0x4068, "in_solar_pump"),
    (0x4069, "in_thermostat1"),
    (0x406A, "in_thermostat2"),
    (0x406B, "in_406b"),
    (0x406C, "in_backup_heater"),
    (0x406D, "in_outing_mode"),
    (0x406F, "in_reference_ehs_temp"),
    (0x4070, "in_dischage_temp_control"),
    (0x4073, "in_4073"),
    (0x4074, "in_4074"),
    (0x4077, "in_4077"),
    (0x407B, "in_407b"),
    (0x407D, "in_407d"),
    (0x407E, "in_louver_lr_swing"),
    (0x4085, "in_4085"),
    (0x4086, "in_4086"),
    (0x4087, "in_booster_heater"),
    (0x4089, "in_state_water_pump"),
    (0x408A, "in_2way_valve"),
    (0x4095, "in_fsv_2091"),
    (0x4096, "in_fsv_2092"),
    (0x4097, "in_fsv_3011"),
    (0x4099, "in_fsv_3041"),
    (0x409A, "in_fsv_3042"),
    (0x409C, "in_fsv_3061"),
    (0x40B4, "in_fsv_5061"),
    (0x40B5, "in_40b5"),
    (0x40C4, "in_waterpump_pwm_value"),
    (0x40C5, "in_thermostat_water_heater"),
    (0x40C6, "in_40c6"),
    (0x4117, "in_4117"),
    (0x411A, "in_fsv_4061"),
    (0x411E, "in_operation_power_zone2"),
    (0x4124, "in_sg_ready_mode_state"),
    (0x4125, "in_fsv_load_save"),
    (0x4127, "in_fsv_2093"),
    (0x4128, "in_fsv_5022"),
    (0x4201, "in_temp_target_f"),
    (0x4202, "in_temp_4202"),
    (0x4203, "in_temp_room_f"),
    (0x4204, "in_temp_4204"),
    (0x4205, "in_temp_eva_in_f"),
    (0x4206, "in_temp_eva_out_f"),
    (0x420C, "in_temp_420c"),
    (0x4211, "in_capacity_request"),
    (0x4212, "in_capacity_absolute"),
    (0x4213, "in_4213"),
    (0x4217, "in_eev_value_real_1"),
    (0x4229, "in_model_information"),
    (0x4235, "in_temp_water_heater_target_f"),
    (0x4236, "in_temp_water_in_f"),
    (0x4237, "in_temp_water_tank_f"),
    (0x4238, "in_temp_water_out_f"),
    (0x4239, "in_temp_water_out2_f"),
    (0x423E, "in_423e"),
    (0x4247, "in_temp_water_outlet_target_f"),
    (0x4248, "in_temp_water_law_target_f"),
    (0x424A, "in_fsv_1011"),
    (0x424B, "in_fsv_1012"),
    (0x424C, "in_fsv_1021"),
    (0x424D, "in_fsv_1022"),
    (0x424E, "in_fsv_1031"),
    (0x424F, "in_fsv_1032"),
    (0x4250, "in_fsv_1041"),
    (0x4251, "in_fsv_1042"),
    (0x4252, "in_fsv_1051"),
    (0x4253, "in_fsv_1052"),
    (0x4269, "in_fsv_3043"),
    (0x426A, "in_fsv_3044"),
    (0x426B, "in_fsv_3045"),
    (0x4273, "in_fsv_5011"),
    (0x4274, "in_fsv_5012"),
    (0x4275, "in_fsv_5013"),
    (0x4276, "in_fsv_5014"),
    (0x4277, "in_fsv_5015"),
    (0x4278, "in_fsv_5016"),
    (0x4279, "in_fsv_5017"),
    (0x427A, "in_fsv_5018"),
    (0x427B, "in_fsv_5019"),
    (0x427F, "in_temp_water_law_f"),
    (0x428C, "in_temp_mixing_valve_f"),
    (0x428D, "in_428d"),
    (0x42CE, "in_fsv_3046"),
    (0x42D4, "in_temp_zone2_f"),
    (0x42D6, "in_temp_target_zone2_f"),
    (0x42D7, "in_temp_water_outlet_target_zone2_f"),
    (0x42D8, "in_temp_water_outlet_zone1_f"),
    (0x42D9, "in_temp_water_outlet_zone2_f"),
    (0x42E8, "in_flow_sensor_voltage"),
    (0x42E9, "in_flow_sensor_calc"),
    (0x42F1, "in_42f1"),
    (0x4301, "in_4301"),
    (0x4401, "in_4401"),
    (0x440A, "in_device_staus_heatpump_boiler"),
    (0x440E, "in_440e"),
    (0x440F, "in_440f"),
    (0x4423, "in_4423"),
    (0x4424, "in_4424"),
    (0x4426, "in_4426"),
    (0x4427, "in_4427"),
    (0x8000, "out_operation_service_op"),
    (0x8001, "out_operation_odu_mode"),
    (0x8002, "out_8002"),
    (0x8003, "out_operation_heatcool"),
    (0x8005, "out_8005"),
    (0x800D, "out_800d"),
    (0x8010, "out_load_comp1"),
    (0x8017, "out_load_hotgas"),
    (0x801A, "out_load_4way"),
    (0x8020, "out_load_outeev"),
    (0x8031, "out_8031"),
    (0x8032, "out_8032"),
    (0x8033, "out_8033"),
    (0x803F, "out_803f"),
    (0x8043, "out_8043"),
    (0x8045, "out_8045"),
    (0x8046, "out_op_test_op_complete"),
    (0x8047, "out_8047"),
    (0x8048, "out_8048"),
    (0x805E, "out_805e"),
    (0x8061, "out_deice_step_indoor"),
    (0x8066, "out_8066"),
    (0x8077, "out_8077"),
    (0x8079, "out_8079"),
    (0x807C, "out_807c"),
    (0x807D, "out_807d"),
    (0x807E, "out_807e"),
    (0x8081, "out_8081"),
    (0x808C, "out_808c"),
    (0x808D, "out_808d"),
    (0x808E, "out_op_check_ref_step"),
    (0x808F, "out_808f"),
    (0x80A8, "out_80a8"),
    (0x80A9, "out_80a9"),
    (0x80AA, "out_80aa"),
    (0x80AB, "out_80ab"),
    (0x80AE, "out_80ae"),
    (0x80AF, "out_load_baseheater"),
    (0x80B1, "out_80b1"),
    (0x80CE, "out_80ce"),
    (0x8200, "out_8200"),
    (0x8201, "out_8201"),
    (0x8202, "out_install_comp_num"),
    (0x8204, "out_sensor_airout"),
    (0x8206, "out_sensor_highpress"),
    (0x8208, "out_sensor_lowpress"),
    (0x820A, "out_sensor_discharge1"),
    (0x8217, "out_sensor_ct1"),
    (0x8218, "out_sensor_condout"),
    (0x821A, "out_sensor_suction"),
    (0x8223, "out_control_target_discharge"),
    (0x8225, "out_8225"),
    (0x8229, "out_load_outeev1"),
    (0x822C, "out_load_outeev4"),
    (0x8233, "out_8233"),
    (0x8235, "out_error_code"),
    (0x8236, "out_control_order_cfreq_comp1"),
    (0x8237, "out_control_target_cfreq_comp1"),
    (0x8238, "out_control_cfreq_comp1"),
    (0x8239, "out_8239"),
    (0x823B, "out_sensor_dclink_voltage"),
    (0x823D, "out_load_fanrpm1"),
    (0x823E, "out_load_fanrpm2"),
    (0x823F, "out_823f"),
    (0x8243, "out_8243"),
    (0x8247, "out_8247"),
    (0x8248, "out_8248"),
    (0x824B, "out_824b"),
    (0x824C, "out_824c"),
    (0x824F, "out_control_refrigerants_volume"),
    (0x8254, "out_sensor_ipm1"),
    (0x8274, "out_control_order_cfreq_comp2"),
    (0x8275, "out_control_target_cfreq_comp2"),
    (0x8280, "out_sensor_top1"),
    (0x8287, "out_install_capa"),
    (0x829F, "out_sensor_sat_temp_high_pressure"),
    (0x82A0, "out_sensor_sat_temp_low_pressure"),
    (0x82A2, "out_82a2"),
    (0x82B5, "out_82b5"),
    (0x82B6, "out_82b6"),
    (0x82BC, "out_project_code"),
    (0x82D4, "out_82d4"),
    (0x82D9, "out_82d9"),
    (0x82DA, "out_82da"),
    (0x82DB, "out_phase_current"),
    (0x82DC, "out_82dc"),
    (0x82DD, "out_82dd"),
    (0x82DE, "out_sensor_evain"),
    (0x82DF, "out_sensor_tw1"),
    (0x82E0, "out_sensor_tw2"),
    (0x82E1, "out_82e1"),
    (0x82E3, "out_product_option_capa"),
    (0x82ED, "out_82ed"),
    (0x8405, "out_load_comp1_running_time"),
    (0x8406, "out_8406"),
    (0x8408, "out_8408"),
    (0x840F, "out_840f"),
    (0x8410, "out_8410"),
    (0x8411, "out_8411"),
    (0x8413, "out_control_wattmeter_1w_1min_sum"),
    (0x8414, "out_8414"),
    (0x8417, "out_8417"),
    (0x841F, "out_841f"),
    (0x8429, "out_8429"),
];

/// Number of catalogued capabilities
pub const LEN: usize = CATALOG.len();

/// Slot index of a message number, `None` if it is not catalogued
pub fn index_of(number: MessageNumber) -> Option<usize> {
    CATALOG.binary_search_by_key(&number.0, |(n, _)| *n).ok()
}

/// Capability name of a message number
pub fn name_of(number: MessageNumber) -> Option<&'static str> {
    index_of(number).map(|i| CATALOG[i].1)
}

/// Message number stored at a slot index
pub fn number_at(index: usize) -> Option<MessageNumber> {
    CATALOG.get(index).map(|(n, _)| MessageNumber(*n))
}

/// Look a capability up by name
pub fn by_name(name: &str) -> Option<MessageNumber> {
    CATALOG
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(number, _)| MessageNumber(*number))
}
